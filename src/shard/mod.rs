//! Hash-based shard/replica placement, synchronous and asynchronous
//! replication, read fallback, and consistency checking.

mod manager;
mod worker;

pub use manager::ShardManager;

use sha2::{Digest, Sha256};

/// Deterministic shard placement: `big_endian_uint(SHA-256(key)) mod num_shards`.
///
/// Matches `int(hashlib.sha256(key.encode()).hexdigest(), 16) % num_shards`
/// in the reference implementation exactly: the full 32-byte digest is
/// folded as one big-endian integer rather than truncated to a machine
/// word, since placement is part of the on-disk contract (spec.md §9) and
/// must not silently diverge from the source for keys whose shard would
/// differ under a truncated hash.
pub fn shard_id(key: &str, num_shards: usize) -> usize {
    assert!(num_shards > 0, "num_shards must be positive");
    let digest = Sha256::digest(key.as_bytes());
    let mut acc: u128 = 0;
    let modulus = num_shards as u128;
    for byte in digest.iter() {
        acc = (acc * 256 + *byte as u128) % modulus;
    }
    acc as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_id_is_stable_across_calls() {
        let a = shard_id("perf0", 2);
        let b = shard_id("perf0", 2);
        assert_eq!(a, b);
    }

    #[test]
    fn shard_id_matches_reference_big_int_mod() {
        // Values cross-checked against `int(hashlib.sha256(key.encode()).hexdigest(), 16) % n`.
        assert_eq!(shard_id("alice", 2), 0);
        assert_eq!(shard_id("perf0", 4), 3);
        assert_eq!(shard_id("perf1", 4), 3);
    }

    #[test]
    fn shard_id_distributes_keys_across_both_shards() {
        let mut seen = [false, false];
        for i in 0..100 {
            let key = format!("perf{i}");
            seen[shard_id(&key, 2)] = true;
        }
        assert!(seen[0] && seen[1], "expected both shards to receive at least one key");
    }
}
