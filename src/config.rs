//! Construction-time configuration for the storage engine and shard manager.

use std::path::PathBuf;

/// Configuration for a single [`crate::storage::Replica`].
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Directory holding `data.bin` and `index.bin` for this replica.
    pub cold_path: PathBuf,
    /// Fraction of available physical memory used to derive `hot_limit`.
    pub max_memory_ratio: f64,
    /// Divisor used alongside `max_memory_ratio` to derive `hot_limit`.
    pub avg_item_size: u64,
    /// Per-key cold history retention (index entries, not log bytes).
    pub max_versions: usize,
}

impl ReplicaConfig {
    /// A replica config rooted at `cold_path` with every other field at its
    /// default value.
    pub fn new(cold_path: impl Into<PathBuf>) -> Self {
        Self {
            cold_path: cold_path.into(),
            ..Self::default()
        }
    }
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            cold_path: PathBuf::from("data/cold_store/shard0_rep0"),
            max_memory_ratio: 0.5,
            avg_item_size: 1024,
            max_versions: 5,
        }
    }
}

/// Configuration for a [`crate::shard::ShardManager`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of shards the key space is partitioned into.
    pub num_shards: usize,
    /// Number of replicas maintained per shard (replica 0 is primary).
    pub replica_count: usize,
    /// Fraction of available physical memory used to derive each replica's
    /// `hot_limit`.
    pub max_memory_ratio: f64,
    /// Divisor used alongside `max_memory_ratio` to derive `hot_limit`.
    pub avg_item_size: u64,
    /// Per-key cold history retention.
    pub max_versions: usize,
    /// Root directory under which `shard{i}_rep{j}` subdirectories are
    /// created.
    pub cold_root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            num_shards: 2,
            replica_count: 2,
            max_memory_ratio: 0.5,
            avg_item_size: 1024,
            max_versions: 5,
            cold_root: PathBuf::from("data/cold_store"),
        }
    }
}

impl StoreConfig {
    /// The on-disk directory for shard `shard_id`, replica `replica_id`,
    /// following the `data/cold_store/shard<i>_rep<j>/` convention.
    pub fn replica_path(&self, shard_id: usize, replica_id: usize) -> PathBuf {
        self.cold_root
            .join(format!("shard{shard_id}_rep{replica_id}"))
    }
}
