use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::storage::HashRecord;

/// Byte counters shared by every hashing worker.
///
/// Workers add the bytes a hash will cost to `total_to_read` before starting
/// and add to `total_read` as reads complete. Adds are relaxed atomics, so
/// the ratio is monotone with respect to arriving deltas but an individual
/// snapshot is not a serialised point in time.
#[derive(Debug, Default)]
pub struct HashCounters {
    total_read: AtomicU64,
    total_to_read: AtomicU64,
}

impl HashCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_read(&self, bytes: u64) {
        self.total_to_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_read(&self, bytes: u64) {
        self.total_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// (total_read, total_to_read)
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.total_read.load(Ordering::Relaxed),
            self.total_to_read.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.total_read.store(0, Ordering::Relaxed);
        self.total_to_read.store(0, Ordering::Relaxed);
    }
}

/// Trait for reporting scan progress.
///
/// The CLI implements this with indicatif; tests use `SilentReporter`.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_hash_queued(&self, _path: &Path, _bytes_to_read: u64) {}
    fn on_bytes_read(&self, _delta: u64, _total_read: u64, _total_to_read: u64) {}
    fn on_entry_hashed(&self, _record: &HashRecord, _from_cache: bool) {}
    fn on_round_started(&self, _segment_length: u64, _candidate_groups: usize) {}
    fn on_round_complete(&self, _segment_length: u64, _surviving_groups: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
