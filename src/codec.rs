//! Binary record codec.
//!
//! Translates `(key, value, schema_version, extra)` to and from a
//! self-describing byte record. All integer fields are big-endian, unsigned,
//! fixed width.
//!
//! ```text
//! schema 1:       u8 version=1  | u32 key_len | u32 value_len              | key | value
//! schema 2,3,4:   u8 version    | u32 key_len | u32 value_len | u32 extra_len | key | value | extra
//! ```
//!
//! `value` is JSON-encoded to UTF-8 and then compressed with the standard
//! zlib envelope (`flate2`'s deflate implementation, default compression
//! level). `value_len` is the *compressed* byte count.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::CodecError;

const SCHEMA_1_HEADER_LEN: usize = 1 + 4 + 4;
const SCHEMA_234_HEADER_LEN: usize = 1 + 4 + 4 + 4;

/// The set of schema versions the codec understands.
pub fn is_supported_schema(version: u8) -> bool {
    matches!(version, 1 | 2 | 3 | 4)
}

/// A decoded record plus the number of bytes consumed from the input
/// buffer, so callers scanning an append-only log can advance past exactly
/// one record without knowing its layout in advance.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// The logical key, or a history key of the form `"<key>::hist..."`.
    pub key: String,
    /// The decoded JSON value.
    pub value: Value,
    /// Schema version the record was encoded with.
    pub schema_version: u8,
    /// Optional extra field, only ever `Some` for schema versions 2-4.
    pub extra: Option<String>,
    /// Number of bytes read from the start of the input slice.
    pub consumed: usize,
}

/// Encode `(key, value, schema_version, extra)` into a wire-format record.
///
/// Fails with [`CodecError::UnsupportedSchema`] if `schema_version` is not
/// in `{1, 2, 3, 4}`, and with the JSON/compression variants of
/// [`CodecError`] if serialization fails.
pub fn encode(
    key: &str,
    value: &Value,
    schema_version: u8,
    extra: Option<&str>,
) -> Result<Vec<u8>, CodecError> {
    if !is_supported_schema(schema_version) {
        return Err(CodecError::UnsupportedSchema(schema_version));
    }

    let key_bytes = key.as_bytes();
    let value_json = serde_json::to_vec(value)?;
    let value_compressed = compress(&value_json)?;

    let mut out = Vec::with_capacity(SCHEMA_234_HEADER_LEN + key_bytes.len() + value_compressed.len());
    out.push(schema_version);
    out.extend_from_slice(&(key_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&(value_compressed.len() as u32).to_be_bytes());

    if schema_version == 1 {
        out.extend_from_slice(key_bytes);
        out.extend_from_slice(&value_compressed);
    } else {
        let extra_bytes = extra.unwrap_or("").as_bytes();
        out.extend_from_slice(&(extra_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(key_bytes);
        out.extend_from_slice(&value_compressed);
        out.extend_from_slice(extra_bytes);
    }

    Ok(out)
}

/// Decode exactly one record from the start of `data`.
///
/// Reads the version byte, dispatches to the matching layout, decompresses
/// and JSON-decodes the value, and decodes `key`/`extra` as UTF-8. If
/// `data` is longer than one record, the extra bytes are ignored; the
/// returned [`DecodedRecord::consumed`] tells the caller how many bytes
/// belonged to this record.
pub fn decode(data: &[u8]) -> Result<DecodedRecord, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Truncated {
            expected: 1,
            found: 0,
        });
    }
    let schema_version = data[0];
    if !is_supported_schema(schema_version) {
        return Err(CodecError::UnsupportedSchema(schema_version));
    }

    if schema_version == 1 {
        if data.len() < SCHEMA_1_HEADER_LEN {
            return Err(CodecError::Truncated {
                expected: SCHEMA_1_HEADER_LEN,
                found: data.len(),
            });
        }
        let key_len = u32::from_be_bytes(data[1..5].try_into().unwrap()) as usize;
        let value_len = u32::from_be_bytes(data[5..9].try_into().unwrap()) as usize;
        let total = SCHEMA_1_HEADER_LEN + key_len + value_len;
        if data.len() < total {
            return Err(CodecError::Truncated {
                expected: total,
                found: data.len(),
            });
        }

        let key_start = SCHEMA_1_HEADER_LEN;
        let key = String::from_utf8(data[key_start..key_start + key_len].to_vec())?;
        let value_start = key_start + key_len;
        let value_compressed = &data[value_start..value_start + value_len];
        let value = decode_value(value_compressed)?;

        Ok(DecodedRecord {
            key,
            value,
            schema_version,
            extra: None,
            consumed: total,
        })
    } else {
        if data.len() < SCHEMA_234_HEADER_LEN {
            return Err(CodecError::Truncated {
                expected: SCHEMA_234_HEADER_LEN,
                found: data.len(),
            });
        }
        let key_len = u32::from_be_bytes(data[1..5].try_into().unwrap()) as usize;
        let value_len = u32::from_be_bytes(data[5..9].try_into().unwrap()) as usize;
        let extra_len = u32::from_be_bytes(data[9..13].try_into().unwrap()) as usize;
        let total = SCHEMA_234_HEADER_LEN + key_len + value_len + extra_len;
        if data.len() < total {
            return Err(CodecError::Truncated {
                expected: total,
                found: data.len(),
            });
        }

        let key_start = SCHEMA_234_HEADER_LEN;
        let key = String::from_utf8(data[key_start..key_start + key_len].to_vec())?;
        let value_start = key_start + key_len;
        let value_compressed = &data[value_start..value_start + value_len];
        let value = decode_value(value_compressed)?;
        let extra_start = value_start + value_len;
        let extra = if extra_len > 0 {
            Some(String::from_utf8(
                data[extra_start..extra_start + extra_len].to_vec(),
            )?)
        } else {
            None
        };

        Ok(DecodedRecord {
            key,
            value,
            schema_version,
            extra,
            consumed: total,
        })
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decode_value(compressed: &[u8]) -> Result<Value, CodecError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Build an explicit version-tagged key: `"<key>::<YYYYMMDDTHHMMSSffffff>"`,
/// using local wall clock at microsecond precision.
pub fn versioned_key(key: &str) -> String {
    let now = chrono::Local::now();
    format!("{}::{}", key, now.format("%Y%m%dT%H%M%S%6f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn encode_v1_matches_wire_framing() {
        let value = json!({"age": 30});
        let bytes = encode("alice", &value, 1, None).unwrap();

        assert_eq!(bytes[0], 1);
        let key_len = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(key_len, 5);
        let value_len = u32::from_be_bytes(bytes[5..9].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 9 + 5 + value_len);
        assert_eq!(&bytes[9..14], b"alice");

        let mut decoder = ZlibDecoder::new(&bytes[14..14 + value_len]);
        let mut json_bytes = Vec::new();
        decoder.read_to_end(&mut json_bytes).unwrap();
        assert_eq!(json_bytes, br#"{"age":30}"#);
    }

    #[test]
    fn round_trip_all_schema_versions() {
        let value = json!({"name": "bob", "tags": ["a", "b"]});
        for version in 1..=4u8 {
            let extra = if version == 1 { None } else { Some("meta") };
            let encoded = encode("k", &value, version, extra).unwrap();
            let decoded = decode(&encoded).unwrap();

            assert_eq!(decoded.key, "k");
            assert_eq!(decoded.value, value);
            assert_eq!(decoded.schema_version, version);
            assert_eq!(decoded.extra.as_deref(), extra);
            assert_eq!(decoded.consumed, encoded.len());
        }
    }

    #[test]
    fn schema_234_framing_length() {
        let value = json!({"x": 1});
        let encoded = encode("key", &value, 2, Some("extra")).unwrap();
        let value_len = u32::from_be_bytes(encoded[5..9].try_into().unwrap()) as usize;
        assert_eq!(encoded.len(), 13 + 3 + value_len + 5);
    }

    #[test]
    fn unsupported_schema_rejected_on_encode_and_decode() {
        let value = json!({});
        assert!(matches!(
            encode("k", &value, 5, None),
            Err(CodecError::UnsupportedSchema(5))
        ));

        let mut bad = vec![5u8];
        bad.extend_from_slice(&[0; 12]);
        assert!(matches!(
            decode(&bad),
            Err(CodecError::UnsupportedSchema(5))
        ));
    }

    #[test]
    fn decode_ignores_trailing_bytes_and_reports_consumed() {
        let value = json!({"a": 1});
        let mut encoded = encode("k", &value, 1, None).unwrap();
        let record_len = encoded.len();
        encoded.extend_from_slice(b"garbage-trailer");

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.consumed, record_len);
        assert_eq!(decoded.value, value);
    }

    #[test]
    fn versioned_key_has_expected_shape() {
        let vk = versioned_key("alice");
        assert!(vk.starts_with("alice::"));
        let suffix = vk.split("::").nth(1).unwrap();
        assert_eq!(suffix.len(), 20); // YYYYMMDDTHHMMSSffffff
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_arbitrary_keys_and_extras(
            key in "[a-zA-Z0-9_:]{0,64}",
            age in 0i64..1_000_000,
            name in "[a-zA-Z ]{0,32}",
            version in 1u8..=4u8,
            extra in proptest::option::of("[a-zA-Z0-9 ]{0,32}"),
        ) {
            let extra = if version == 1 { None } else { extra };
            let value = json!({"age": age, "name": name});
            let encoded = encode(&key, &value, version, extra.as_deref()).unwrap();
            let decoded = decode(&encoded).unwrap();

            prop_assert_eq!(&decoded.key, &key);
            prop_assert_eq!(decoded.value, value);
            prop_assert_eq!(decoded.schema_version, version);
            prop_assert_eq!(decoded.extra, extra);
            prop_assert_eq!(decoded.consumed, encoded.len());
        }
    }
}
