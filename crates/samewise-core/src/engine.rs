//! Duplicate detection pipeline.
//!
//! Phase 1 hashes every configured root at the initial segment length and
//! groups the persisted records by fingerprint. Phase 2 re-verifies the
//! candidate groups through a fixed schedule of growing sample sizes,
//! finishing with a whole-file round, so every surviving group is an exact
//! content match.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::HashCache;
use crate::config::{self, AppConfig};
use crate::error::Error;
use crate::fingerprint::Fingerprint;
use crate::hasher::{BufferPool, IO_BLOCK_SIZE};
use crate::progress::{HashCounters, ProgressReporter, SilentReporter};
use crate::scheduler::HashScheduler;
use crate::storage::{HashRecord, HashStore, SqliteStore};

/// Sample-size multipliers of the verification rounds, applied to
/// `initial_segment_length`. The final zero means "whole file".
///
/// Each round refines the previous one: a group surviving round *k* has
/// matched three sampled windows of `k` times the initial segment length,
/// and the last round proves byte-for-byte equality.
pub const VERIFICATION_STEPS: [u64; 7] = [2, 4, 8, 16, 32, 64, 0];

pub struct DupeEngine {
    config: AppConfig,
    cache: Arc<HashCache>,
    permits: Arc<Semaphore>,
    pool: Arc<BufferPool>,
    counters: Arc<HashCounters>,
    cancel: Arc<AtomicBool>,
}

/// One member of a duplicate group.
#[derive(Debug, Clone)]
pub struct DupeMember {
    pub path: String,
    pub is_directory: bool,
}

/// Entries proven to share their full content.
#[derive(Debug, Clone)]
pub struct DupeGroup {
    pub fingerprint: Fingerprint,
    pub data_length: u64,
    pub members: Vec<DupeMember>,
    /// Bytes spent on copies beyond the first member.
    pub wasted_bytes: u64,
}

#[derive(Debug)]
pub struct DupeReport {
    pub groups: Vec<DupeGroup>,
    pub candidate_groups: usize,
    pub rounds_run: usize,
    pub scan_duration: Duration,
    pub verify_duration: Duration,
    pub total_wasted_bytes: u64,
}

impl DupeEngine {
    /// Open the engine against the persistent cache named by the config.
    pub fn open(config: AppConfig) -> Result<Self, Error> {
        let store: Arc<dyn HashStore> = Arc::new(SqliteStore::open(&config.cache_path)?);
        Ok(Self::with_store(config, store))
    }

    /// Build the engine over an explicit store (tests use an in-memory one).
    pub fn with_store(config: AppConfig, store: Arc<dyn HashStore>) -> Self {
        let cache = Arc::new(HashCache::new(store, &config));
        let permits = Arc::new(Semaphore::new(config.max_jobs.max(1)));
        Self {
            cache,
            permits,
            pool: BufferPool::new(IO_BLOCK_SIZE),
            counters: Arc::new(HashCounters::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Shared cancellation flag; set it to stop the run at the next
    /// suspension point.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn counters(&self) -> Arc<HashCounters> {
        Arc::clone(&self.counters)
    }

    pub fn store(&self) -> Arc<dyn HashStore> {
        self.cache.store()
    }

    /// Hash a single path at an arbitrary segment length.
    pub async fn hash_path(&self, path: &Path, segment_length: u64) -> Result<HashRecord, Error> {
        let scheduler = self.scheduler_for(segment_length, Arc::new(SilentReporter));
        scheduler.hash(path).await
    }

    /// Run the full pipeline over the configured roots.
    pub async fn find_duplicates(
        &self,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<DupeReport, Error> {
        let roots = config::non_overlapping_directories(self.config.root_paths.clone());
        if roots.is_empty() {
            return Err(Error::Other("no root paths configured".to_string()));
        }

        let initial = self.config.initial_segment_length;

        // Phase 1a: make sure every root is hashed at the initial segment
        // length. Unchanged entries are served from the cache.
        info!("Scanning {} root(s) at segment length {}", roots.len(), initial);
        let scan_start = Instant::now();
        let scheduler = self.scheduler_for(initial, Arc::clone(&reporter));
        let mut canonical_roots = Vec::with_capacity(roots.len());
        for root in &roots {
            let record = scheduler.hash(Path::new(root)).await?;
            canonical_roots.push(record.path.clone());
        }
        let scan_duration = scan_start.elapsed();
        debug!("Scan completed in {:.2}s", scan_duration.as_secs_f64());

        // Phase 1b: candidate grouping straight from the persistent tier.
        let prefix = match canonical_roots.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        let store = self.cache.store();
        let groups = tokio::task::spawn_blocking(move || {
            store.group_by_fingerprint(initial, prefix.as_deref())
        })
        .await
        .map_err(|e| Error::Other(format!("grouping task failed: {e}")))??;

        let mut groups: Vec<Vec<HashRecord>> =
            groups.into_iter().filter(|g| g.len() >= 2).collect();
        let candidate_groups = groups.len();
        info!("{} candidate groups", candidate_groups);

        // Phase 2: verification rounds with growing sample sizes.
        let verify_start = Instant::now();
        let mut rounds_run = 0;
        for step in VERIFICATION_STEPS {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            if groups.is_empty() {
                break;
            }

            let segment_length = step * initial;
            reporter.on_round_started(segment_length, groups.len());
            let scheduler = self.scheduler_for(segment_length, Arc::clone(&reporter));
            groups = self.verify_round(&scheduler, groups).await?;
            rounds_run += 1;
            reporter.on_round_complete(segment_length, groups.len());
            debug!(
                "Round at segment {} left {} group(s)",
                segment_length,
                groups.len()
            );
        }
        let verify_duration = verify_start.elapsed();

        let mut out: Vec<DupeGroup> = groups
            .into_iter()
            .map(|group| {
                let first = &group[0];
                let wasted_bytes = first.wasted_bytes(group.len());
                DupeGroup {
                    fingerprint: first.fingerprint,
                    data_length: first.data_length,
                    wasted_bytes,
                    members: group
                        .into_iter()
                        .map(|r| DupeMember {
                            path: r.path,
                            is_directory: r.is_directory,
                        })
                        .collect(),
                }
            })
            .collect();
        for group in &mut out {
            group.members.sort_by(|a, b| a.path.cmp(&b.path));
        }
        out.sort_by(|a, b| {
            b.wasted_bytes
                .cmp(&a.wasted_bytes)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        let total_wasted_bytes = out.iter().map(|g| g.wasted_bytes).sum();

        info!(
            "{} duplicate group(s) after {} round(s), {} bytes wasted",
            out.len(),
            rounds_run,
            total_wasted_bytes
        );
        Ok(DupeReport {
            groups: out,
            candidate_groups,
            rounds_run,
            scan_duration,
            verify_duration,
            total_wasted_bytes,
        })
    }

    /// Re-hash every member of every group at the scheduler's segment
    /// length, then regroup by `(fingerprint, data_length)` and drop
    /// singletons. Members that vanished or became unreadable drop out of
    /// their group.
    async fn verify_round(
        &self,
        scheduler: &Arc<HashScheduler>,
        groups: Vec<Vec<HashRecord>>,
    ) -> Result<Vec<Vec<HashRecord>>, Error> {
        let mut regrouped: AHashMap<(Fingerprint, u64), Vec<HashRecord>> = AHashMap::new();

        for group in groups {
            let mut handles = Vec::with_capacity(group.len());
            for member in group {
                let scheduler = Arc::clone(scheduler);
                handles.push(tokio::spawn(async move {
                    scheduler.hash(Path::new(&member.path)).await
                }));
            }
            for handle in handles {
                match handle.await {
                    Ok(Ok(record)) => regrouped
                        .entry((record.fingerprint, record.data_length))
                        .or_default()
                        .push(record),
                    Ok(Err(Error::Cancelled)) => return Err(Error::Cancelled),
                    Ok(Err(e)) => debug!("Dropping candidate from its group: {}", e),
                    Err(e) => warn!("Verification task failed: {}", e),
                }
            }
        }

        Ok(regrouped
            .into_values()
            .filter(|group| group.len() >= 2)
            .collect())
    }

    fn scheduler_for(
        &self,
        segment_length: u64,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Arc<HashScheduler> {
        HashScheduler::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.permits),
            segment_length,
            self.config.ignore_patterns.clone(),
            Arc::clone(&self.pool),
            Arc::clone(&self.counters),
            reporter,
            Arc::clone(&self.cancel),
        )
    }
}
