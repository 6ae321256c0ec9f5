use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use serde_json::Value;

use crate::config::{ReplicaConfig, StoreConfig};
use crate::error::ShardError;
use crate::storage::Replica;

use super::shard_id;
use super::worker::{self, ReplicationJob};

/// Hash-based shard/replica placement over a fixed set of replicated,
/// two-tier storage engines.
///
/// Replica 0 of each shard is the primary; replicas `1..replica_count` are
/// secondaries. Writes can fan out synchronously to every replica in order,
/// or apply to the primary and enqueue the secondaries for a background
/// worker thread to pick up. Reads fall back across replicas in order and
/// treat the first non-`None` result as the answer.
pub struct ShardManager {
    config: StoreConfig,
    shards: Vec<Vec<Arc<Replica>>>,
    async_sender: mpsc::Sender<ReplicationJob>,
    _worker: thread::JoinHandle<()>,
}

impl ShardManager {
    /// Construct a shard manager with `config.num_shards` shards of
    /// `config.replica_count` replicas each, rooted at
    /// `config.cold_root.join("shard{i}_rep{j}")`.
    pub fn new(config: StoreConfig) -> Result<Self, ShardError> {
        let mut shards = Vec::with_capacity(config.num_shards);

        for shard_id in 0..config.num_shards {
            let mut replicas = Vec::with_capacity(config.replica_count);
            for replica_id in 0..config.replica_count {
                let replica_config = ReplicaConfig {
                    cold_path: config.replica_path(shard_id, replica_id),
                    max_memory_ratio: config.max_memory_ratio,
                    avg_item_size: config.avg_item_size,
                    max_versions: config.max_versions,
                };
                let replica = Replica::open(&replica_config).map_err(|source| ShardError::Replica {
                    shard_id,
                    replica_id,
                    source,
                })?;
                replicas.push(Arc::new(replica));
            }
            shards.push(replicas);
        }

        let (async_sender, async_receiver) = mpsc::channel::<ReplicationJob>();
        let worker_shards = shards.clone();
        let worker = thread::Builder::new()
            .name("shardkv-async-replicator".to_string())
            .spawn(move || worker::run(async_receiver, worker_shards))
            .map_err(|e| ShardError::Startup(format!("failed to spawn background replicator thread: {e}")))?;

        log::info!(
            "ShardManager initialized: {} shards, {} replicas",
            config.num_shards,
            config.replica_count
        );

        Ok(Self {
            config,
            shards,
            async_sender,
            _worker: worker,
        })
    }

    /// Number of shards the key space is partitioned into.
    pub fn num_shards(&self) -> usize {
        self.config.num_shards
    }

    /// Number of replicas maintained per shard.
    pub fn replica_count(&self) -> usize {
        self.config.replica_count
    }

    /// The replicas backing a given shard, primary first.
    pub fn shard_replicas(&self, shard_id: usize) -> Option<&[Arc<Replica>]> {
        self.shards.get(shard_id).map(Vec::as_slice)
    }

    /// Deterministic shard placement for `key`: `big_endian_uint(SHA-256(key)) mod num_shards`.
    pub fn shard_id_for(&self, key: &str) -> usize {
        shard_id(key, self.config.num_shards)
    }

    /// Write `key` to its shard.
    ///
    /// With `async_replication = false` (the default semantics), every
    /// replica of the shard is written in order 0..N-1 synchronously; a
    /// per-replica failure is logged and does not abort the remaining
    /// fan-out. With `async_replication = true`, only the primary is
    /// written synchronously and the secondaries are enqueued for the
    /// background replicator.
    pub fn put(
        &self,
        key: &str,
        value: Value,
        write_to_cold: bool,
        async_replication: bool,
        schema_version: u8,
        extra: Option<&str>,
    ) -> Result<(), ShardError> {
        let shard_id = self.shard_id_for(key);
        let replicas = self
            .shards
            .get(shard_id)
            .ok_or_else(|| ShardError::OutOfRange(format!("shard {shard_id} does not exist")))?;

        if async_replication {
            let primary = replicas
                .first()
                .ok_or_else(|| ShardError::OutOfRange(format!("shard {shard_id} has no primary replica")))?;
            primary
                .put(key, value.clone(), write_to_cold, schema_version, extra)
                .map_err(|source| ShardError::Replica {
                    shard_id,
                    replica_id: 0,
                    source,
                })?;

            let job = ReplicationJob {
                key: key.to_string(),
                value,
                write_to_cold,
                shard_id,
                schema_version,
                extra: extra.map(str::to_string),
            };
            if self.async_sender.send(job).is_err() {
                log::error!("async replication worker is gone; dropping replication of key {key}");
            }
            log::debug!("putting key {key} async on shard {shard_id}");
        } else {
            for (replica_id, replica) in replicas.iter().enumerate() {
                if let Err(source) = replica.put(key, value.clone(), write_to_cold, schema_version, extra) {
                    log::warn!(
                        "replica {replica_id} of shard {shard_id} failed put({key}): {source}"
                    );
                    continue;
                }
                log::debug!("put key {key} to shard {shard_id}, replica {replica_id}");
            }
        }

        Ok(())
    }

    /// Read `key`, trying each replica of its shard in order and returning
    /// the first non-`None` result. A replica failure is logged and
    /// treated as a miss rather than aborting the search.
    pub fn get(&self, key: &str) -> Result<Option<Value>, ShardError> {
        let shard_id = self.shard_id_for(key);
        let replicas = self
            .shards
            .get(shard_id)
            .ok_or_else(|| ShardError::OutOfRange(format!("shard {shard_id} does not exist")))?;

        for (replica_id, replica) in replicas.iter().enumerate() {
            match replica.get(key) {
                Ok(Some(value)) => {
                    log::info!("retrieved key {key} from shard {shard_id}, replica {replica_id}");
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("replica {replica_id} of shard {shard_id} failed get({key}): {e}");
                }
            }
        }

        log::error!("key {key} not found in any replica of shard {shard_id}");
        Ok(None)
    }

    /// `true` iff every replica of `key`'s shard agrees on its value
    /// (stringified comparison, matching a replica exception's being
    /// treated as a `None` observation).
    pub fn check_replica_consistency(&self, key: &str) -> Result<bool, ShardError> {
        let shard_id = self.shard_id_for(key);
        let replicas = self
            .shards
            .get(shard_id)
            .ok_or_else(|| ShardError::OutOfRange(format!("shard {shard_id} does not exist")))?;

        let values: Vec<Option<Value>> = replicas
            .iter()
            .map(|replica| replica.get(key).unwrap_or(None))
            .collect();

        let Some(first) = values.first().map(stringify_option) else {
            // A shard with zero replicas is vacuously consistent: there is
            // nothing to disagree.
            log::warn!("consistency check on shard {shard_id} found no replicas");
            return Ok(true);
        };
        let consistent = values.iter().all(|v| stringify_option(v) == first);

        if consistent {
            log::info!("key {key} consistent on shard {shard_id}");
        } else {
            log::warn!("inconsistent replicas for {key} on shard {shard_id}: {values:?}");
        }

        Ok(consistent)
    }

    /// Flush every replica's hot tier to cold. Returns a
    /// `shard_id -> [flushed count per replica]` mapping.
    pub fn day_change(&self) -> Result<Vec<Vec<usize>>, ShardError> {
        let mut flushed = Vec::with_capacity(self.shards.len());
        for (shard_id, replicas) in self.shards.iter().enumerate() {
            let mut counts = Vec::with_capacity(replicas.len());
            for (replica_id, replica) in replicas.iter().enumerate() {
                let count = replica.day_change().map_err(|source| ShardError::Replica {
                    shard_id,
                    replica_id,
                    source,
                })?;
                counts.push(count);
            }
            flushed.push(counts);
        }
        Ok(flushed)
    }

    /// The root directory new replica cold stores are created under.
    pub fn cold_root(&self) -> &Path {
        &self.config.cold_root
    }
}

fn stringify_option(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}
