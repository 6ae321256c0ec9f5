//! # shardkv
//!
//! A sharded, replicated, two-tier (hot in-memory / cold on-disk) key-value
//! store supporting multi-version records and schema-tagged binary encoding.
//!
//! ## Architecture
//!
//! - `codec`: binary record encoding/decoding across four schema variants,
//!   with zlib value compression
//! - `storage`: per-replica storage engine — bounded hot cache, append-only
//!   cold log, persisted offset index, per-key version history
//! - `shard`: shard/replica manager — hash-based placement, synchronous or
//!   background-queued replication, read fallback, consistency check
//!
//! Day-change (bulk hot-to-cold flush) is exposed as a method on
//! [`storage::Replica`] and [`shard::ShardManager`] rather than a type of
//! its own, matching how this crate models other externally-triggered
//! lifecycle operations.
//!
//! This crate is a library with no network protocol and no interactive
//! shell; the surrounding application (command parsing, input validation,
//! schema registry contents) is an external collaborator that consumes the
//! core only through the operations these modules expose.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Record codec: four binary schema variants, zlib value compression.
pub mod codec;

/// Construction-time configuration for replicas and the shard manager.
pub mod config;

/// Error taxonomy shared across the codec, storage, and shard layers.
pub mod error;

/// Per-replica storage engine.
pub mod storage;

/// Shard/replica manager and background replicator.
pub mod shard;

pub use config::{ReplicaConfig, StoreConfig};
pub use error::{CodecError, ShardError, StorageError};
pub use shard::ShardManager;
pub use storage::{RawRecord, Replica};

/// Crate version, re-exported for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, re-exported for diagnostics.
pub const NAME: &str = env!("CARGO_PKG_NAME");
