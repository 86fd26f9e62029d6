//! Persistent tier of the fingerprint cache.
//!
//! The engine talks to an abstract `HashStore`; `SqliteStore` is the shipped
//! implementation. The store is advisory: callers treat every fault as a
//! cache miss and re-hash.

mod models;
mod queries;
mod sqlite;

pub use models::{parent_directory, EntryMeta, HashRecord};
pub use sqlite::SqliteStore;

use crate::error::Error;

/// Persistence interface of the cache.
///
/// Keys are the derived `uuid` (`"{segment_length};{path}"`). Writes are
/// last-writer-wins upserts; concurrent writes of the same key carry the
/// same payload, so they are idempotent.
pub trait HashStore: Send + Sync {
    /// Make sure the `uuid` key is uniquely indexed.
    fn ensure_unique_index(&self) -> Result<(), Error>;

    /// Fetch one row by primary key.
    fn get(&self, uuid: &str) -> Result<Option<HashRecord>, Error>;

    /// Fetch the row for `path` that satisfies a lookup at `segment_length`
    /// and was written no earlier than `min_last_write_utc`.
    ///
    /// A sampled lookup (`segment_length > 0`) is satisfied by an exact
    /// segment match or by a whole-hash row covering a file small enough
    /// that the lookup itself would have whole-hashed it
    /// (`data_length ≤ 2·segment_length`).
    fn find_valid(
        &self,
        path: &str,
        segment_length: u64,
        min_last_write_utc: i64,
    ) -> Result<Option<HashRecord>, Error>;

    /// All rows satisfying `segment_length` whose `directory_path` equals
    /// `directory_path` or lies underneath it.
    fn load_directory(
        &self,
        directory_path: &str,
        segment_length: u64,
    ) -> Result<Vec<HashRecord>, Error>;

    /// Rows satisfying `segment_length`, optionally restricted to paths at
    /// or under `path_prefix`, grouped by equal fingerprint.
    fn group_by_fingerprint(
        &self,
        segment_length: u64,
        path_prefix: Option<&str>,
    ) -> Result<Vec<Vec<HashRecord>>, Error>;

    /// Insert or replace the row keyed by the record's `uuid`.
    fn upsert(&self, record: &HashRecord) -> Result<(), Error>;
}
