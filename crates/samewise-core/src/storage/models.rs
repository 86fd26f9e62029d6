use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};

use crate::fingerprint::Fingerprint;

/// One persisted fingerprint row, uniquely identified by
/// `(segment_length, path)`.
///
/// `segment_length` is zero when the fingerprint covers the whole entry;
/// otherwise it is the sample window size. For directories `data_length` is
/// the recursive sum of the children's `data_length`.
#[derive(Debug, Clone, PartialEq)]
pub struct HashRecord {
    pub path: String,
    pub directory_path: String,
    pub is_directory: bool,
    pub segment_length: u64,
    pub data_length: u64,
    pub fingerprint: Fingerprint,
    /// Modification time of the source entry at hash time, in nanoseconds
    /// since the UNIX epoch.
    pub last_write_utc: i64,
    pub hash_time_utc: DateTime<Utc>,
}

impl HashRecord {
    /// Derived primary key of the persistent tier.
    pub fn uuid(&self) -> String {
        format!("{};{}", self.segment_length, self.path)
    }

    /// Whether this record still describes the filesystem entry `meta`.
    ///
    /// A record is stale when the entry kind changed, the entry was written
    /// after the record was taken, or (for files) the length changed.
    pub fn is_fresh(&self, meta: &EntryMeta) -> bool {
        if self.is_directory != meta.is_directory {
            return false;
        }
        if meta.last_write_utc > self.last_write_utc {
            return false;
        }
        if !self.is_directory && self.data_length != meta.data_length {
            return false;
        }
        true
    }

    /// Bytes that exist only as extra copies if `count` entries share this
    /// record's content.
    pub fn wasted_bytes(&self, count: usize) -> u64 {
        self.data_length * (count.saturating_sub(1) as u64)
    }
}

/// The slice of filesystem metadata the cache freshness rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    pub is_directory: bool,
    pub data_length: u64,
    /// Nanoseconds since the UNIX epoch; subsecond precision matters, a
    /// second-granularity key misses rapid rewrites.
    pub last_write_utc: i64,
}

impl EntryMeta {
    pub fn of(meta: &std::fs::Metadata) -> Self {
        let last_write_utc = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self {
            is_directory: meta.is_dir(),
            data_length: if meta.is_dir() { 0 } else { meta.len() },
            last_write_utc,
        }
    }
}

/// Containing directory of `path` as stored in `directory_path`; empty for
/// filesystem roots.
pub fn parent_directory(path: &Path) -> String {
    path.parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}
