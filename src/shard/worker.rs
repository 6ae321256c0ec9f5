//! Background replicator: drains queued async writes into secondary
//! replicas on a dedicated thread.
//!
//! spec.md's design notes call out the source's busy-spin `while True: if
//! self.async_queue: ...` loop as a known wart ("Implementations should use
//! a blocking queue or condition variable"). This worker blocks on
//! [`mpsc::Receiver::recv`] instead of polling: the thread parks until a
//! job arrives, and exits cleanly once the [`ShardManager`](super::ShardManager)
//! owning the sender half is dropped — the idiomatic equivalent of the
//! source's daemon thread, with no explicit shutdown signal of its own.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use serde_json::Value;

use crate::storage::Replica;

/// One queued asynchronous replication: a write already applied to the
/// primary, waiting to be fanned out to the shard's secondary replicas.
pub struct ReplicationJob {
    /// The key being written.
    pub key: String,
    /// The value being written.
    pub value: Value,
    /// Whether the write should also append to each secondary's cold log.
    pub write_to_cold: bool,
    /// Which shard the secondaries belong to.
    pub shard_id: usize,
    /// Schema version to encode with.
    pub schema_version: u8,
    /// Optional extra field (schema versions 2-4 only).
    pub extra: Option<String>,
}

/// Drain `receiver` until its sender half is dropped, applying each job to
/// every secondary replica (index 1..N-1) of its target shard. There is no
/// batching: jobs are processed one at a time, in enqueue order.
pub fn run(receiver: Receiver<ReplicationJob>, shards: Vec<Vec<Arc<Replica>>>) {
    log::info!("background replicator started");
    while let Ok(job) = receiver.recv() {
        let Some(replicas) = shards.get(job.shard_id) else {
            log::error!(
                "async replication job referenced unknown shard {}",
                job.shard_id
            );
            continue;
        };

        for (offset, replica) in replicas.iter().skip(1).enumerate() {
            let replica_id = offset + 1;
            if let Err(e) = replica.put(
                &job.key,
                job.value.clone(),
                job.write_to_cold,
                job.schema_version,
                job.extra.as_deref(),
            ) {
                log::error!(
                    "async replication of key {} to shard {} replica {replica_id} failed: {e}",
                    job.key,
                    job.shard_id
                );
                continue;
            }
            log::debug!(
                "async replicated key {} to shard {}, replica {replica_id}",
                job.key,
                job.shard_id
            );
        }
    }
    log::info!("background replicator shutting down: sender dropped");
}
