//! Error taxonomy for the codec, storage, and shard-manager layers.

use thiserror::Error;

/// Errors raised by [`crate::codec`].
#[derive(Error, Debug)]
pub enum CodecError {
    /// `schema_version` was outside `{1, 2, 3, 4}`.
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u8),

    /// JSON encoding/decoding of the value failed.
    #[error("json encode/decode failed: {0}")]
    Json(#[from] serde_json::Error),

    /// zlib compression/decompression of the value failed.
    #[error("value compression failed: {0}")]
    Compression(#[from] std::io::Error),

    /// `key` or `extra` bytes were not valid UTF-8.
    #[error("invalid utf-8 in record field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The buffer ended before a complete record could be read.
    #[error("truncated record: expected at least {expected} bytes, found {found}")]
    Truncated {
        /// Minimum number of bytes required to decode the record.
        expected: usize,
        /// Number of bytes actually available.
        found: usize,
    },
}

/// Errors raised by a single [`crate::storage::Replica`].
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failure encoding or decoding a record.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Failure reading, appending to, or seeking within the cold log or
    /// index sidecar file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The offset index references a location that turned out not to hold
    /// a decodable record.
    #[error("index corruption: key {key:?} points at offset {offset} which could not be decoded: {cause}")]
    IndexCorruption {
        /// The key whose index entry was bad.
        key: String,
        /// The byte offset the index pointed at.
        offset: u64,
        /// Underlying decode failure.
        cause: CodecError,
    },
}

/// Errors raised by [`crate::shard::ShardManager`].
#[derive(Error, Debug)]
pub enum ShardError {
    /// A replica operation failed.
    #[error("storage error on shard {shard_id} replica {replica_id}: {source}")]
    Replica {
        /// Shard index the failing replica belongs to.
        shard_id: usize,
        /// Replica index within the shard.
        replica_id: usize,
        /// Underlying storage failure.
        #[source]
        source: StorageError,
    },

    /// A shard or replica index was out of range.
    #[error("shard/replica index out of range: {0}")]
    OutOfRange(String),

    /// The manager failed to bring up a required background resource
    /// (currently: spawning the async replicator thread).
    #[error("failed to start shard manager: {0}")]
    Startup(String),
}
