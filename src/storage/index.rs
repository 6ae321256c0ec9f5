//! The in-memory offset index and its on-disk sidecar / rebuild-by-scan.
//!
//! spec leaves the sidecar format as an implementation choice as long as it
//! is reloadable by the same implementation and the engine falls back to a
//! full log scan when the sidecar is absent or unreadable. This module uses
//! a small length-prefixed format rather than pulling in a second,
//! general-purpose serialization crate for a single file:
//!
//! ```text
//! u32 count ‖ (u32 key_len ‖ key_bytes ‖ u64 offset)*
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Offset of the most recently appended record for a key, keyed by key
/// (including history keys, which live only in the index/cold log and
/// never in the hot tier).
pub type OffsetIndex = HashMap<String, u64>;

/// Persist `index` to `path`, overwriting any existing file.
pub fn save(path: &Path, index: &OffsetIndex) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&(index.len() as u32).to_be_bytes())?;
    for (key, offset) in index {
        let key_bytes = key.as_bytes();
        writer.write_all(&(key_bytes.len() as u32).to_be_bytes())?;
        writer.write_all(key_bytes)?;
        writer.write_all(&offset.to_be_bytes())?;
    }
    writer.flush()
}

/// Load an index previously written by [`save`].
///
/// Returns `Ok(None)` if `path` does not exist, and `Err` if the file
/// exists but could not be parsed as a valid index (truncated, corrupt
/// length-prefix, etc) — both cases tell the caller to fall back to
/// rebuilding from the cold log.
pub fn load(path: &Path) -> io::Result<Option<OffsetIndex>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);

    let mut count_buf = [0u8; 4];
    reader.read_exact(&mut count_buf)?;
    let count = u32::from_be_bytes(count_buf) as usize;

    let mut index = HashMap::with_capacity(count);
    for _ in 0..count {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let key_len = u32::from_be_bytes(len_buf) as usize;

        let mut key_buf = vec![0u8; key_len];
        reader.read_exact(&mut key_buf)?;
        let key = String::from_utf8(key_buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut offset_buf = [0u8; 8];
        reader.read_exact(&mut offset_buf)?;
        let offset = u64::from_be_bytes(offset_buf);

        index.insert(key, offset);
    }

    Ok(Some(index))
}

/// Rebuild the index by scanning the cold log record by record.
///
/// Handles schema versions 1 and 2-4 (which share version 2's 12-byte
/// header layout, per spec's note that the source branches only on
/// `== 1`/`== 2` but versions 3 and 4 use the same layout). On any parse
/// failure, or an unrecognized version byte, resyncs by advancing one byte
/// past the start of the failed record. The final entry written for each
/// key is always the most recent, since the scan proceeds in append order.
pub fn rebuild_from_log(log_path: &Path) -> io::Result<OffsetIndex> {
    let mut index = OffsetIndex::new();

    if !log_path.exists() {
        return Ok(index);
    }

    let data = std::fs::read(log_path)?;
    let len = data.len() as u64;
    let mut offset: u64 = 0;

    while offset < len {
        match scan_one_record(&data, offset) {
            Some((key, next_offset)) => {
                index.insert(key, offset);
                offset = next_offset;
            }
            None => {
                offset += 1;
            }
        }
    }

    Ok(index)
}

/// Parse just enough of one record at `offset` to learn its key and where
/// the next record starts, without decompressing the value. Returns `None`
/// on any malformed header, short read, or unrecognized version byte.
fn scan_one_record(data: &[u8], offset: u64) -> Option<(String, u64)> {
    let start = offset as usize;
    let version = *data.get(start)?;

    match version {
        1 => {
            let key_len = read_u32(data, start + 1)? as usize;
            let key_start = start + 9;
            let key = read_utf8(data, key_start, key_len)?;
            let value_len = read_u32(data, start + 5)? as usize;
            let next = key_start + key_len + value_len;
            if next as u64 > data.len() as u64 {
                return None;
            }
            Some((key, next as u64))
        }
        2 | 3 | 4 => {
            let key_len = read_u32(data, start + 1)? as usize;
            let value_len = read_u32(data, start + 5)? as usize;
            let extra_len = read_u32(data, start + 9)? as usize;
            let key_start = start + 13;
            let key = read_utf8(data, key_start, key_len)?;
            let next = key_start + key_len + value_len + extra_len;
            if next as u64 > data.len() as u64 {
                return None;
            }
            Some((key, next as u64))
        }
        _ => None,
    }
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let slice = data.get(at..at + 4)?;
    Some(u32::from_be_bytes(slice.try_into().ok()?))
}

fn read_utf8(data: &[u8], at: usize, len: usize) -> Option<String> {
    let slice = data.get(at..at + len)?;
    String::from_utf8(slice.to_vec()).ok()
}

/// All index keys for `key`'s history, i.e. starting with `"<key>::hist"`.
pub fn history_keys<'a>(index: &'a OffsetIndex, key: &str) -> Vec<&'a str> {
    let prefix = history_prefix(key);
    let mut keys: Vec<&str> = index
        .keys()
        .filter(|k| k.starts_with(&prefix))
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    keys
}

/// The shared prefix for a key's history entries: `"<key>::hist"`.
pub fn history_prefix(key: &str) -> String {
    format!("{key}::hist")
}
