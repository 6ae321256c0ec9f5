//! Per-replica storage engine: bounded hot tier, append-only cold log,
//! offset index, and version history.

pub mod index;
pub mod replica;

pub use replica::{RawRecord, Replica};
