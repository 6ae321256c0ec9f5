//! Per-replica storage engine: bounded hot tier, append-only cold log,
//! offset index, and per-key version history.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use sysinfo::{System, SystemExt};

use crate::codec;
use crate::config::ReplicaConfig;
use crate::error::StorageError;
use crate::storage::index::{self, OffsetIndex};

const MIN_HOT_LIMIT: usize = 10;

/// The full decoded tuple a record carries, as returned by
/// [`Replica::get_raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// The key the record was stored under.
    pub key: String,
    /// The decoded value.
    pub value: Value,
    /// Schema version the value was last written with. Hot-tier hits always
    /// report `1` since schema/extra are not retained in memory.
    pub schema_version: u8,
    /// Extra field, if the record carries one. Always `None` for hot-tier
    /// hits.
    pub extra: Option<String>,
}

struct ReplicaState {
    hot: LruCache<String, Value>,
    index: OffsetIndex,
}

/// A single replica's storage engine: a bounded in-memory hot tier backed
/// by an append-only cold log and an offset index.
pub struct Replica {
    cold_path: PathBuf,
    cold_file: PathBuf,
    index_file: PathBuf,
    hot_limit: usize,
    max_versions: usize,
    state: Mutex<ReplicaState>,
}

impl Replica {
    /// Open (or create) a replica rooted at `config.cold_path`.
    ///
    /// Ensures the cold directory exists. If `index.bin` exists and parses,
    /// it is loaded; otherwise the index is rebuilt by scanning `data.bin`
    /// and the rebuilt index is persisted.
    pub fn open(config: &ReplicaConfig) -> Result<Self, StorageError> {
        let hot_limit = compute_hot_limit(config.max_memory_ratio, config.avg_item_size);
        Self::open_with_hot_limit(config, hot_limit)
    }

    /// Like [`Replica::open`], but with an explicit `hot_limit` instead of
    /// one derived from available physical memory. Exposed for tests that
    /// need a small, deterministic capacity rather than whatever the host
    /// machine happens to have free.
    pub fn open_with_hot_limit(config: &ReplicaConfig, hot_limit: usize) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.cold_path)?;

        let cold_file = config.cold_path.join("data.bin");
        let index_file = config.cold_path.join("index.bin");

        let index = match index::load(&index_file) {
            Ok(Some(index)) => {
                log::info!("loaded index from {}", index_file.display());
                index
            }
            Ok(None) | Err(_) => {
                log::warn!(
                    "rebuilding index for {} from cold log",
                    config.cold_path.display()
                );
                let rebuilt = index::rebuild_from_log(&cold_file)?;
                index::save(&index_file, &rebuilt)?;
                rebuilt
            }
        };

        log::info!(
            "replica initialized: {}, hot limit: {}",
            config.cold_path.display(),
            hot_limit
        );

        Ok(Self {
            cold_path: config.cold_path.clone(),
            cold_file,
            index_file,
            hot_limit,
            max_versions: config.max_versions,
            state: Mutex::new(ReplicaState {
                hot: LruCache::unbounded(),
                index,
            }),
        })
    }

    /// The directory this replica persists its cold log and index under.
    pub fn cold_path(&self) -> &Path {
        &self.cold_path
    }

    /// The fixed hot-tier capacity derived at construction.
    pub fn hot_limit(&self) -> usize {
        self.hot_limit
    }

    /// Insert or overwrite `key`.
    ///
    /// If `key` is already present in the hot tier, the previous value is
    /// archived to cold under a synthetic history key before being
    /// overwritten, and old history entries beyond `max_versions` are
    /// pruned from the index. If the hot tier is at capacity, the
    /// insertion-oldest entry is evicted to cold first.
    pub fn put(
        &self,
        key: &str,
        value: Value,
        write_to_cold: bool,
        schema_version: u8,
        extra: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();

        if let Some(old_value) = state.hot.peek(key).cloned() {
            let hist_key = format!("{key}::hist{}", now_millis());
            self.append_cold(&mut state, &hist_key, &old_value, schema_version, extra)?;
            self.prune_history_locked(&mut state, key)?;
        }

        if state.hot.len() >= self.hot_limit {
            if let Some((evicted_key, evicted_value)) = state.hot.pop_lru() {
                self.append_cold(&mut state, &evicted_key, &evicted_value, 1, None)?;
            }
        }

        state.hot.put(key.to_string(), value.clone());

        if write_to_cold {
            self.append_cold(&mut state, key, &value, schema_version, extra)?;
        }

        log::debug!("put key {key}");
        Ok(())
    }

    /// Look up `key`, returning `None` if it is present in neither the hot
    /// tier nor the index.
    ///
    /// A cold hit is promoted into the hot tier (evicting the
    /// insertion-oldest entry first if the hot tier is full), so that the
    /// `|hot| <= hot_limit` invariant holds even across read-promotion.
    pub fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let mut state = self.state.lock();

        if let Some(value) = state.hot.get(key) {
            return Ok(Some(value.clone()));
        }

        if let Some(&offset) = state.index.get(key) {
            let record = self.read_record_at(offset, key)?;
            self.promote_locked(&mut state, key, record.value.clone())?;
            return Ok(Some(record.value));
        }

        Ok(None)
    }

    /// Like [`Replica::get`], but returns the full decoded tuple. Hot-tier
    /// hits report `schema_version = 1` and `extra = None` since those
    /// fields are not retained in memory.
    pub fn get_raw(&self, key: &str) -> Result<Option<RawRecord>, StorageError> {
        let mut state = self.state.lock();

        if let Some(value) = state.hot.get(key) {
            return Ok(Some(RawRecord {
                key: key.to_string(),
                value: value.clone(),
                schema_version: 1,
                extra: None,
            }));
        }

        if let Some(&offset) = state.index.get(key) {
            let record = self.read_record_at(offset, key)?;
            self.promote_locked(&mut state, key, record.value.clone())?;
            return Ok(Some(RawRecord {
                key: key.to_string(),
                value: record.value,
                schema_version: record.schema_version,
                extra: record.extra,
            }));
        }

        Ok(None)
    }

    /// All known versions of `key`: `"latest"` plus every history entry,
    /// keyed by its full history key, in ascending (oldest-first) order.
    ///
    /// Calling this for a key whose latest value lives only in cold
    /// promotes it into the hot tier as a side effect of reading, matching
    /// [`Replica::get`].
    pub fn get_all_versions(&self, key: &str) -> Result<HashMap<String, Value>, StorageError> {
        let mut result = HashMap::new();

        if let Some(value) = self.get(key)? {
            result.insert("latest".to_string(), value);
        }

        let state = self.state.lock();
        let hist_keys: Vec<String> = index::history_keys(&state.index, key)
            .into_iter()
            .map(str::to_string)
            .collect();
        let offsets: Vec<(String, u64)> = hist_keys
            .into_iter()
            .filter_map(|hk| state.index.get(&hk).map(|&off| (hk, off)))
            .collect();
        drop(state);

        for (hist_key, offset) in offsets {
            let record = self.read_record_at(offset, &hist_key)?;
            result.insert(hist_key, record.value);
        }

        Ok(result)
    }

    /// Drop all but the most recent `max_versions` history-index entries for
    /// `key`. Cold-log bytes for the dropped entries are not reclaimed.
    pub fn clean_old_versions(&self, key: &str, max_versions: usize) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        self.clean_old_versions_locked(&mut state, key, max_versions)
    }

    fn prune_history_locked(
        &self,
        state: &mut ReplicaState,
        key: &str,
    ) -> Result<(), StorageError> {
        let max_versions = self.max_versions;
        self.clean_old_versions_locked(state, key, max_versions)
    }

    fn clean_old_versions_locked(
        &self,
        state: &mut ReplicaState,
        key: &str,
        max_versions: usize,
    ) -> Result<(), StorageError> {
        let versions = index::history_keys(&state.index, key);
        if versions.len() <= max_versions {
            return Ok(());
        }

        let to_remove: Vec<String> = versions[..versions.len() - max_versions]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for old in &to_remove {
            state.index.remove(old);
        }
        index::save(&self.index_file, &state.index)?;
        log::info!("cleaned {} old versions of '{key}'", to_remove.len());
        Ok(())
    }

    /// Flush every entry currently in the hot tier to cold, emptying it.
    /// Returns the number of entries flushed.
    pub fn day_change(&self) -> Result<usize, StorageError> {
        let mut state = self.state.lock();
        let mut flushed = 0usize;

        while let Some((key, value)) = state.hot.pop_lru() {
            self.append_cold(&mut state, &key, &value, 1, None)?;
            flushed += 1;
        }

        Ok(flushed)
    }

    fn promote_locked(
        &self,
        state: &mut ReplicaState,
        key: &str,
        value: Value,
    ) -> Result<(), StorageError> {
        if state.hot.len() >= self.hot_limit {
            if let Some((evicted_key, evicted_value)) = state.hot.pop_lru() {
                self.append_cold(state, &evicted_key, &evicted_value, 1, None)?;
            }
        }
        state.hot.put(key.to_string(), value);
        Ok(())
    }

    fn append_cold(
        &self,
        state: &mut ReplicaState,
        key: &str,
        value: &Value,
        schema_version: u8,
        extra: Option<&str>,
    ) -> Result<(), StorageError> {
        let record = codec::encode(key, value, schema_version, extra)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.cold_file)?;
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(&record)?;
        file.flush()?;

        state.index.insert(key.to_string(), offset);
        index::save(&self.index_file, &state.index)?;
        Ok(())
    }

    fn read_record_at(&self, offset: u64, key: &str) -> Result<codec::DecodedRecord, StorageError> {
        let mut file = File::open(&self.cold_file)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        codec::decode(&buf).map_err(|cause| StorageError::IndexCorruption {
            key: key.to_string(),
            offset,
            cause,
        })
    }
}

fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis()
}

fn compute_hot_limit(max_memory_ratio: f64, avg_item_size: u64) -> usize {
    let mut system = System::new();
    system.refresh_memory();
    // `available_memory` is in bytes on recent sysinfo releases and in KiB
    // on older ones pinned elsewhere in this workspace's dependency graph;
    // this crate pins a release that reports bytes.
    let available_bytes = system.available_memory();
    let budget = (available_bytes as f64) * max_memory_ratio;
    let derived = (budget / avg_item_size.max(1) as f64) as usize;
    derived.max(MIN_HOT_LIMIT)
}
