//! Two-tier fingerprint cache.
//!
//! Lookups hit the in-memory tier first, then fall through to the
//! persistent store. File lookups pre-cache their parent directory's
//! subtree in bulk to amortise store round-trips; a per-segment negative
//! set short-circuits repeated misses. The store is advisory — every
//! persistent fault degrades to a miss.

use std::path::Path;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::storage::{parent_directory, EntryMeta, HashRecord, HashStore};

pub struct HashCache {
    store: Arc<dyn HashStore>,
    /// segment_length → path → record
    memory: DashMap<u64, DashMap<String, HashRecord>>,
    /// Paths proven absent from the persistent tier in this run.
    negative: DashMap<u64, DashSet<String>>,
    /// Directories whose subtree rows were already bulk-loaded.
    loaded_directories: DashMap<u64, DashSet<String>>,
    precache_directories: bool,
    restrict_files_to_mem_cache: bool,
}

impl HashCache {
    pub fn new(store: Arc<dyn HashStore>, config: &AppConfig) -> Self {
        if let Err(e) = store.ensure_unique_index() {
            warn!("Could not ensure cache index: {}", e);
        }
        Self {
            store,
            memory: DashMap::new(),
            negative: DashMap::new(),
            loaded_directories: DashMap::new(),
            precache_directories: config.precache_directories,
            restrict_files_to_mem_cache: config.restrict_files_to_mem_cache,
        }
    }

    pub fn store(&self) -> Arc<dyn HashStore> {
        Arc::clone(&self.store)
    }

    /// Look up a fresh record for `path` at `segment_length`.
    pub async fn get(
        &self,
        path: &str,
        meta: &EntryMeta,
        segment_length: u64,
    ) -> Option<HashRecord> {
        if let Some(hit) = self.memory_lookup(path, meta, segment_length) {
            return Some(hit);
        }

        if self
            .negative
            .get(&segment_length)
            .map_or(false, |misses| misses.contains(path))
        {
            return None;
        }

        if !meta.is_directory {
            // Pull the whole parent directory out of the store at once, then
            // look again.
            let parent = parent_directory(Path::new(path));
            if !parent.is_empty() {
                self.precache_directory(&parent, segment_length).await;
                if let Some(hit) = self.memory_lookup(path, meta, segment_length) {
                    return Some(hit);
                }
            }
            if self.restrict_files_to_mem_cache {
                self.note_miss(path, segment_length);
                return None;
            }
        }

        let record = self
            .query_store(path.to_string(), segment_length, meta.last_write_utc)
            .await;

        match record {
            Some(record) if record.is_fresh(meta) => {
                if meta.is_directory && self.precache_directories {
                    self.precache_directory(path, segment_length).await;
                }
                self.remember(record.clone());
                Some(record)
            }
            _ => {
                self.note_miss(path, segment_length);
                None
            }
        }
    }

    /// Record a freshly computed hash in both tiers.
    pub async fn put(&self, record: HashRecord) {
        self.remember(record.clone());

        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || {
            let uuid = record.uuid();
            (store.upsert(&record), uuid)
        })
        .await
        {
            Ok((Ok(()), _)) => {}
            Ok((Err(e), uuid)) => warn!("Cache upsert failed for {}: {}", uuid, e),
            Err(e) => warn!("Cache upsert task failed: {}", e),
        }
    }

    fn memory_lookup(&self, path: &str, meta: &EntryMeta, segment_length: u64) -> Option<HashRecord> {
        if let Some(hit) = self.tier_lookup(segment_length, path, meta) {
            return Some(hit);
        }
        // A whole-hash row satisfies a sampled lookup when the lookup would
        // itself have whole-hashed the file.
        if segment_length > 0 {
            if let Some(hit) = self.tier_lookup(0, path, meta) {
                if hit.data_length <= 2 * segment_length {
                    return Some(hit);
                }
            }
        }
        None
    }

    fn tier_lookup(&self, segment_length: u64, path: &str, meta: &EntryMeta) -> Option<HashRecord> {
        let tier = self.memory.get(&segment_length)?;
        let record = tier.get(path)?;
        if record.is_fresh(meta) {
            Some(record.clone())
        } else {
            drop(record);
            tier.remove(path);
            None
        }
    }

    fn remember(&self, record: HashRecord) {
        if let Some(misses) = self.negative.get(&record.segment_length) {
            misses.remove(&record.path);
        }
        self.memory
            .entry(record.segment_length)
            .or_default()
            .insert(record.path.clone(), record);
    }

    fn note_miss(&self, path: &str, segment_length: u64) {
        self.negative
            .entry(segment_length)
            .or_default()
            .insert(path.to_string());
    }

    /// Bulk-load every persisted row at or under `directory_path` into the
    /// in-memory tier. Each directory is loaded at most once per run.
    async fn precache_directory(&self, directory_path: &str, segment_length: u64) {
        let already = !self
            .loaded_directories
            .entry(segment_length)
            .or_default()
            .insert(directory_path.to_string());
        if already {
            return;
        }

        let store = Arc::clone(&self.store);
        let dir = directory_path.to_string();
        let rows = match tokio::task::spawn_blocking(move || store.load_directory(&dir, segment_length)).await
        {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                warn!("Pre-cache of {} failed: {}", directory_path, e);
                return;
            }
            Err(e) => {
                warn!("Pre-cache task for {} failed: {}", directory_path, e);
                return;
            }
        };

        debug!(
            "Pre-cached {} rows under {} at segment {}",
            rows.len(),
            directory_path,
            segment_length
        );
        for row in rows {
            self.remember(row);
        }
    }

    async fn query_store(
        &self,
        path: String,
        segment_length: u64,
        min_last_write_utc: i64,
    ) -> Option<HashRecord> {
        let store = Arc::clone(&self.store);
        let shown = path.clone();
        match tokio::task::spawn_blocking(move || {
            store.find_valid(&path, segment_length, min_last_write_utc)
        })
        .await
        {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                warn!("Cache lookup for {} failed: {}", shown, e);
                None
            }
            Err(e) => {
                warn!("Cache lookup task for {} failed: {}", shown, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::storage::SqliteStore;
    use chrono::Utc;

    fn test_config() -> AppConfig {
        AppConfig {
            restrict_files_to_mem_cache: false,
            ..AppConfig::default()
        }
    }

    fn cache_with_store() -> (HashCache, Arc<dyn HashStore>) {
        let store: Arc<dyn HashStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        (HashCache::new(Arc::clone(&store), &test_config()), store)
    }

    fn record(path: &str, segment_length: u64, data_length: u64) -> HashRecord {
        HashRecord {
            path: path.to_string(),
            directory_path: parent_directory(Path::new(path)),
            is_directory: false,
            segment_length,
            data_length,
            fingerprint: Fingerprint::of_bytes(path.as_bytes()),
            last_write_utc: 1_000,
            hash_time_utc: Utc::now(),
        }
    }

    fn meta_for(record: &HashRecord) -> EntryMeta {
        EntryMeta {
            is_directory: record.is_directory,
            data_length: record.data_length,
            last_write_utc: record.last_write_utc,
        }
    }

    #[tokio::test]
    async fn put_then_get_hits_memory() {
        let (cache, _) = cache_with_store();
        let rec = record("/r/a.bin", 8192, 100_000);
        let meta = meta_for(&rec);

        cache.put(rec.clone()).await;
        let hit = cache.get("/r/a.bin", &meta, 8192).await.unwrap();
        assert_eq!(hit, rec);
    }

    #[tokio::test]
    async fn stale_record_is_rejected() {
        let (cache, _) = cache_with_store();
        let rec = record("/r/a.bin", 8192, 100_000);
        cache.put(rec.clone()).await;

        // Newer write on disk.
        let mut newer = meta_for(&rec);
        newer.last_write_utc += 1;
        assert!(cache.get("/r/a.bin", &newer, 8192).await.is_none());

        // Changed length.
        let mut resized = meta_for(&rec);
        resized.data_length += 1;
        assert!(cache.get("/r/a.bin", &resized, 8192).await.is_none());
    }

    #[tokio::test]
    async fn whole_hash_row_satisfies_small_sampled_lookup() {
        let (cache, _) = cache_with_store();
        // Whole-hashed 10 KB file: any sampled lookup with 2·S ≥ 10 KB is
        // satisfied by this row.
        let rec = record("/r/small.bin", 0, 10_000);
        let meta = meta_for(&rec);
        cache.put(rec.clone()).await;

        assert!(cache.get("/r/small.bin", &meta, 8192).await.is_some());
        assert!(cache.get("/r/small.bin", &meta, 4096).await.is_none());
    }

    #[tokio::test]
    async fn file_lookup_precaches_parent_from_store() {
        let (cache, store) = cache_with_store();
        let rec = record("/r/d/a.bin", 8192, 100_000);
        let sibling = record("/r/d/b.bin", 8192, 50_000);
        store.upsert(&rec).unwrap();
        store.upsert(&sibling).unwrap();

        // First lookup bulk-loads the parent; the sibling is then a memory
        // hit without further store traffic.
        let hit = cache.get("/r/d/a.bin", &meta_for(&rec), 8192).await;
        assert!(hit.is_some());
        assert!(cache
            .memory_lookup("/r/d/b.bin", &meta_for(&sibling), 8192)
            .is_some());
    }

    #[tokio::test]
    async fn negative_set_short_circuits_repeat_misses() {
        let (cache, _) = cache_with_store();
        let rec = record("/r/missing.bin", 8192, 100);
        let meta = meta_for(&rec);

        assert!(cache.get("/r/missing.bin", &meta, 8192).await.is_none());
        assert!(cache
            .negative
            .get(&8192)
            .map_or(false, |s| s.contains("/r/missing.bin")));

        // A successful hash clears the negative entry.
        cache.put(rec.clone()).await;
        assert!(cache.get("/r/missing.bin", &meta, 8192).await.is_some());
    }

    #[tokio::test]
    async fn restricted_mode_skips_single_file_store_queries() {
        let store: Arc<dyn HashStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = AppConfig::default(); // restrict_files_to_mem_cache = true
        let cache = HashCache::new(Arc::clone(&store), &config);

        let rec = record("lone.bin", 8192, 100_000);
        store.upsert(&rec).unwrap();

        // "lone.bin" has no parent directory to pre-cache, and direct file
        // queries are disabled, so this is a miss despite the stored row.
        assert!(cache.get("lone.bin", &meta_for(&rec), 8192).await.is_none());
    }
}
