//! End-to-end scenarios exercising `ShardManager` across shards and
//! replicas, against a temporary cold root per test.

use serde_json::json;
use shardkv::{ShardManager, StoreConfig};
use tempfile::tempdir;

fn small_config(cold_root: std::path::PathBuf) -> StoreConfig {
    StoreConfig {
        num_shards: 2,
        replica_count: 2,
        max_memory_ratio: 0.5,
        avg_item_size: 1024,
        max_versions: 5,
        cold_root,
    }
}

#[test]
fn placement_is_stable_and_covers_both_shards() {
    let dir = tempdir().unwrap();
    let manager = ShardManager::new(small_config(dir.path().to_path_buf())).unwrap();

    assert_eq!(manager.shard_id_for("perf0"), manager.shard_id_for("perf0"));

    let mut seen = [false, false];
    for i in 0..100 {
        let key = format!("perf{i}");
        seen[manager.shard_id_for(&key)] = true;
    }
    assert!(seen[0] && seen[1]);
}

#[test]
fn overwrite_produces_exactly_one_history_entry() {
    let dir = tempdir().unwrap();
    let manager = ShardManager::new(small_config(dir.path().to_path_buf())).unwrap();

    manager.put("k", json!({"v": 1}), true, false, 1, None).unwrap();
    manager.put("k", json!({"v": 2}), true, false, 1, None).unwrap();

    let shard_id = manager.shard_id_for("k");
    let primary = &manager.shard_replicas(shard_id).unwrap()[0];
    let versions = primary.get_all_versions("k").unwrap();

    assert_eq!(versions.get("latest"), Some(&json!({"v": 2})));
    let hist: Vec<&serde_json::Value> = versions
        .iter()
        .filter(|(k, _)| k.starts_with("k::hist"))
        .map(|(_, v)| v)
        .collect();
    assert_eq!(hist, vec![&json!({"v": 1})]);
}

#[test]
fn read_falls_back_to_secondary_after_primary_cold_file_is_lost() {
    let dir = tempdir().unwrap();
    let manager = ShardManager::new(small_config(dir.path().to_path_buf())).unwrap();

    manager
        .put("k", json!({"v": "hello"}), true, false, 1, None)
        .unwrap();

    let shard_id = manager.shard_id_for("k");
    let replicas = manager.shard_replicas(shard_id).unwrap();
    let primary_cold_file = replicas[0].cold_path().join("data.bin");
    std::fs::remove_file(&primary_cold_file).unwrap();

    // The primary's hot tier still has the value in this process, but a
    // freshly constructed manager over the same cold root simulates a
    // primary whose hot tier was also lost (e.g. process restart after
    // cold-file corruption), leaving only replica 1's copy.
    drop(manager);
    let manager = ShardManager::new(small_config(dir.path().to_path_buf())).unwrap();

    assert_eq!(manager.get("k").unwrap(), Some(json!({"v": "hello"})));
}

#[test]
fn day_change_empties_hot_and_keys_remain_readable_from_cold() {
    let dir = tempdir().unwrap();
    let manager = ShardManager::new(small_config(dir.path().to_path_buf())).unwrap();

    for i in 0..10 {
        manager
            .put(&format!("k{i}"), json!({"v": i}), false, false, 1, None)
            .unwrap();
    }

    let flushed = manager.day_change().unwrap();
    let total: usize = flushed.iter().flatten().sum();
    assert_eq!(total, 10 * manager.replica_count());

    for i in 0..10 {
        assert_eq!(
            manager.get(&format!("k{i}")).unwrap(),
            Some(json!({"v": i}))
        );
    }

    for shard_id in 0..manager.num_shards() {
        for replica in manager.shard_replicas(shard_id).unwrap() {
            // day_change leaves hot empty; a subsequent get for a flushed
            // key promotes exactly one entry back into hot, never more
            // than hot_limit.
            assert!(replica.hot_limit() >= 10);
        }
    }
}

#[test]
fn consistency_check_passes_after_synchronous_put() {
    let dir = tempdir().unwrap();
    let manager = ShardManager::new(small_config(dir.path().to_path_buf())).unwrap();

    manager.put("k", json!({"v": 1}), true, false, 1, None).unwrap();

    assert!(manager.check_replica_consistency("k").unwrap());
}

#[test]
fn async_replication_eventually_reaches_secondary_replicas() {
    let dir = tempdir().unwrap();
    let manager = ShardManager::new(small_config(dir.path().to_path_buf())).unwrap();

    manager
        .put("k", json!({"v": "async"}), true, true, 1, None)
        .unwrap();

    let shard_id = manager.shard_id_for("k");
    let secondary = &manager.shard_replicas(shard_id).unwrap()[1];

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if secondary.get("k").unwrap() == Some(json!({"v": "async"})) {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "async replication did not complete in time");
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}

#[test]
fn index_rebuild_survives_sidecar_deletion_across_whole_store() {
    let dir = tempdir().unwrap();
    let cold_root = dir.path().to_path_buf();

    {
        let manager = ShardManager::new(small_config(cold_root.clone())).unwrap();
        for i in 0..20 {
            manager
                .put(&format!("key{i}"), json!({"v": i}), true, false, 1, None)
                .unwrap();
        }
    }

    for shard_id in 0..2 {
        for replica_id in 0..2 {
            let index_file = cold_root
                .join(format!("shard{shard_id}_rep{replica_id}"))
                .join("index.bin");
            if index_file.exists() {
                std::fs::remove_file(&index_file).unwrap();
            }
        }
    }

    let manager = ShardManager::new(small_config(cold_root)).unwrap();
    for i in 0..20 {
        assert_eq!(
            manager.get(&format!("key{i}")).unwrap(),
            Some(json!({"v": i}))
        );
    }
}
