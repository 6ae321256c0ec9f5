//! shardkv - Sharded, replicated, two-tier key-value store core
//!
//! This binary is a minimal smoke-test harness, not an interactive shell
//! (the shell is an external collaborator, out of scope for this crate per
//! its design spec). It brings up a `ShardManager` with default
//! configuration, performs a handful of representative operations, and
//! exits. It exists so the crate is runnable end to end without pulling in
//! a separate example project.

use std::panic;

use serde_json::json;
use shardkv::{ShardManager, StoreConfig};

fn main() -> anyhow::Result<()> {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("shardkv fatal error:");
        eprintln!("{panic_info}");

        if let Some(location) = panic_info.location() {
            eprintln!("location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("shardkv v{} starting", shardkv::VERSION);

    let config = StoreConfig::default();
    log::info!(
        "configuration: {} shards, {} replicas, cold root {:?}",
        config.num_shards,
        config.replica_count,
        config.cold_root
    );

    let manager = ShardManager::new(config)?;

    manager.put("demo::alice", json!({"name": "alice", "age": 30}), true, false, 1, None)?;
    manager.put("demo::alice", json!({"name": "alice", "age": 31}), true, false, 1, None)?;

    let value = manager.get("demo::alice")?;
    log::info!("get(demo::alice) -> {value:?}");

    let consistent = manager.check_replica_consistency("demo::alice")?;
    log::info!("replica consistency for demo::alice: {consistent}");

    let flushed = manager.day_change()?;
    log::info!("day_change flushed counts by shard/replica: {flushed:?}");

    log::info!("shardkv shutdown complete");
    Ok(())
}
