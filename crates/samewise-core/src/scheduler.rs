//! Bounded-concurrency hash scheduler.
//!
//! Walks a tree, consulting the cache before hashing anything. Every file's
//! I/O happens under one permit of a global semaphore, so no more than
//! `max_jobs` files are ever open at once. Directories hold a permit only
//! while enumerating; their children run as concurrently awaited tasks.
//!
//! Single-entry failures (permission denied, read errors) are logged and
//! omitted from the parent aggregate. Cancellation makes workers return the
//! absent sentinel, which parents likewise skip; nothing partial is written
//! to the cache.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::HashCache;
use crate::error::Error;
use crate::fingerprint::Fingerprint;
use crate::hasher::{self, BufferPool, SamplePlan};
use crate::ignore::IgnoreFilter;
use crate::progress::{HashCounters, ProgressReporter};
use crate::storage::{parent_directory, EntryMeta, HashRecord};

pub struct HashScheduler {
    cache: Arc<HashCache>,
    permits: Arc<Semaphore>,
    segment_length: u64,
    ignore_patterns: Vec<String>,
    pool: Arc<BufferPool>,
    counters: Arc<HashCounters>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: Arc<AtomicBool>,
}

impl HashScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<HashCache>,
        permits: Arc<Semaphore>,
        segment_length: u64,
        ignore_patterns: Vec<String>,
        pool: Arc<BufferPool>,
        counters: Arc<HashCounters>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            permits,
            segment_length,
            ignore_patterns,
            pool,
            counters,
            reporter,
            cancel,
        })
    }

    pub fn segment_length(&self) -> u64 {
        self.segment_length
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Hash one path (file or directory) at this scheduler's segment length.
    ///
    /// The path is canonicalised first and the nearest `.dupeignore` seeds
    /// the ignore filter. Anything that is neither file nor directory is a
    /// caller error.
    pub async fn hash(self: &Arc<Self>, path: &Path) -> Result<HashRecord, Error> {
        let canonical = tokio::fs::canonicalize(path).await?;
        let metadata = tokio::fs::metadata(&canonical).await?;
        if !metadata.is_file() && !metadata.is_dir() {
            return Err(Error::UnsupportedEntry(canonical));
        }
        let meta = EntryMeta::of(&metadata);

        let mut ignore = IgnoreFilter::from_patterns(&self.ignore_patterns);
        ignore.load_nearest(&canonical, meta.is_directory).await;
        let ignore = Arc::new(ignore);

        match Arc::clone(self).hash_entry(canonical.clone(), meta, ignore).await {
            Some(record) => Ok(record),
            None if self.cancelled() => Err(Error::Cancelled),
            None => Err(Error::Unreadable(canonical)),
        }
    }

    /// Recursive worker. `None` means absent: the entry failed or the run
    /// was cancelled — parents skip it either way.
    fn hash_entry(
        self: Arc<Self>,
        path: PathBuf,
        meta: EntryMeta,
        ignore: Arc<IgnoreFilter>,
    ) -> Pin<Box<dyn Future<Output = Option<HashRecord>> + Send>> {
        Box::pin(async move {
            if self.cancelled() {
                return None;
            }

            let path_str = path.to_string_lossy().into_owned();
            if let Some(hit) = self.cache.get(&path_str, &meta, self.segment_length).await {
                self.reporter.on_entry_hashed(&hit, true);
                return Some(hit);
            }

            if meta.is_directory {
                self.hash_directory(path, path_str, meta, ignore).await
            } else {
                self.hash_file(path, path_str, meta).await
            }
        })
    }

    async fn hash_file(&self, path: PathBuf, path_str: String, meta: EntryMeta) -> Option<HashRecord> {
        let plan = SamplePlan::for_length(meta.data_length, self.segment_length);
        self.counters.add_to_read(plan.bytes_to_read());
        self.reporter.on_hash_queued(&path, plan.bytes_to_read());

        // One permit covers this file's I/O, nothing else.
        let permit = self.permits.acquire().await.ok()?;
        if self.cancelled() {
            return None;
        }
        let result = hasher::hash_file(&path, &plan, &self.pool, &self.counters, &self.cancel).await;
        drop(permit);

        let fingerprint = match result {
            Ok(fingerprint) => fingerprint,
            Err(Error::Cancelled) => return None,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                return None;
            }
        };

        let record = HashRecord {
            directory_path: parent_directory(&path),
            path: path_str,
            is_directory: false,
            segment_length: plan.effective_segment_length(),
            data_length: meta.data_length,
            fingerprint,
            last_write_utc: meta.last_write_utc,
            hash_time_utc: Utc::now(),
        };
        self.cache.put(record.clone()).await;

        let (total_read, total_to_read) = self.counters.snapshot();
        self.reporter
            .on_bytes_read(plan.bytes_to_read(), total_read, total_to_read);
        self.reporter.on_entry_hashed(&record, false);
        Some(record)
    }

    async fn hash_directory(
        self: &Arc<Self>,
        path: PathBuf,
        path_str: String,
        meta: EntryMeta,
        ignore: Arc<IgnoreFilter>,
    ) -> Option<HashRecord> {
        let children = self.enumerate_children(&path, &ignore).await?;

        let mut handles = Vec::with_capacity(children.len());
        for (child_path, child_meta) in children {
            if self.cancelled() {
                break;
            }
            let task = Arc::clone(self).hash_entry(child_path, child_meta, Arc::clone(&ignore));
            handles.push(tokio::spawn(task));
        }

        let mut child_fingerprints = Vec::with_capacity(handles.len());
        let mut data_length: u64 = 0;
        for handle in handles {
            match handle.await {
                Ok(Some(child)) => {
                    child_fingerprints.push(child.fingerprint);
                    data_length += child.data_length;
                }
                // Failed or cancelled children are omitted from the
                // aggregate; the directory itself still succeeds.
                Ok(None) => {}
                Err(e) => warn!("Hash task for a child of {} failed: {}", path.display(), e),
            }
        }

        if self.cancelled() {
            return None;
        }

        let record = HashRecord {
            directory_path: parent_directory(&path),
            path: path_str,
            is_directory: true,
            segment_length: self.segment_length,
            data_length,
            fingerprint: Fingerprint::combine(child_fingerprints),
            last_write_utc: meta.last_write_utc,
            hash_time_utc: Utc::now(),
        };
        self.cache.put(record.clone()).await;
        self.reporter.on_entry_hashed(&record, false);
        Some(record)
    }

    /// Enumerate a directory under one permit. Symlinks and special files
    /// are skipped; unreadable entries are logged and dropped.
    async fn enumerate_children(
        &self,
        path: &Path,
        ignore: &IgnoreFilter,
    ) -> Option<Vec<(PathBuf, EntryMeta)>> {
        let _permit = self.permits.acquire().await.ok()?;
        if self.cancelled() {
            return None;
        }

        let mut reader = match tokio::fs::read_dir(path).await {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Cannot enumerate {}: {}", path.display(), e);
                return None;
            }
        };

        let mut children = Vec::new();
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error reading an entry of {}: {}", path.display(), e);
                    break;
                }
            };

            let child_path = entry.path();
            if ignore.is_ignored(&child_path) {
                debug!("Ignoring {}", child_path.display());
                continue;
            }

            match entry.file_type().await {
                // Symlinks are never followed; a link cycle would otherwise
                // turn the tree walk into an infinite descent.
                Ok(file_type) if file_type.is_symlink() => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!("Cannot stat {}: {}", child_path.display(), e);
                    continue;
                }
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Cannot stat {}: {}", child_path.display(), e);
                    continue;
                }
            };
            if !metadata.is_file() && !metadata.is_dir() {
                continue;
            }

            children.push((child_path, EntryMeta::of(&metadata)));
        }

        Some(children)
    }
}
