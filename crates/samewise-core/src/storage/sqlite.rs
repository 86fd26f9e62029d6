use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::debug;

use crate::error::Error;

/// SQLite-backed persistent tier of the fingerprint cache.
///
/// The connection is serialised behind a mutex; workers reach it through
/// `spawn_blocking`, so holders never block an async thread.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        Self::configure_pragmas(&conn)?;
        Self::migrate_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn)?;
        Self::migrate_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure_pragmas(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
        Ok(())
    }

    /// Check schema version and migrate if needed.
    /// Version < 1: drop and recreate (every row is recomputable).
    fn migrate_schema(conn: &Connection) -> rusqlite::Result<()> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < 1 {
            debug!("Schema version {} < 1, recreating hash_record", version);
            conn.execute_batch("DROP TABLE IF EXISTS hash_record;")?;
        }

        conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version 1)");
        Ok(())
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|e| Error::Other(format!("cache store lock poisoned: {e}")))
    }

    /// Number of persisted fingerprint rows.
    pub fn count(&self) -> Result<u64, Error> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM hash_record", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete every persisted fingerprint row.
    pub fn clear(&self) -> Result<(), Error> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM hash_record", [])?;
        debug!("Hash cache cleared");
        Ok(())
    }
}
