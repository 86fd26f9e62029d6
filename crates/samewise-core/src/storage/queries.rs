use std::path::MAIN_SEPARATOR;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Row};
use tracing::debug;

use super::models::HashRecord;
use super::sqlite::SqliteStore;
use super::HashStore;
use crate::error::Error;
use crate::fingerprint::Fingerprint;

const RECORD_COLUMNS: &str = "path, directory_path, is_directory, segment_length, data_length, \
                              fingerprint, last_write_utc, hash_time_utc";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<HashRecord> {
    let fingerprint_bytes: Vec<u8> = row.get(5)?;
    let fingerprint = Fingerprint::from_slice(&fingerprint_bytes).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Blob,
            "fingerprint has the wrong width".into(),
        )
    })?;

    let hash_time_text: String = row.get(7)?;
    let hash_time_utc = DateTime::parse_from_rfc3339(&hash_time_text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(HashRecord {
        path: row.get(0)?,
        directory_path: row.get(1)?,
        is_directory: row.get(2)?,
        segment_length: row.get::<_, i64>(3)? as u64,
        data_length: row.get::<_, i64>(4)? as u64,
        fingerprint,
        last_write_utc: row.get(6)?,
        hash_time_utc,
    })
}

/// Acceptance predicate of cache lookups. `?N` is the queried segment
/// length; a whole-hash row satisfies any sampled query that would itself
/// have whole-hashed the file.
fn segment_constraint(segment_length: u64, param_index: usize) -> String {
    if segment_length == 0 {
        "(segment_length = 0 OR data_length <= 2 * segment_length)".to_string()
    } else {
        format!(
            "(segment_length = ?{idx} OR (segment_length = 0 AND data_length <= 2 * ?{idx}))",
            idx = param_index
        )
    }
}

impl HashStore for SqliteStore {
    fn ensure_unique_index(&self) -> Result<(), Error> {
        let conn = self.connection()?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_hash_record_uuid ON hash_record (uuid)",
            [],
        )?;
        Ok(())
    }

    fn get(&self, uuid: &str) -> Result<Option<HashRecord>, Error> {
        let conn = self.connection()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM hash_record WHERE uuid = ?1");
        match conn.query_row(&sql, params![uuid], row_to_record) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_valid(
        &self,
        path: &str,
        segment_length: u64,
        min_last_write_utc: i64,
    ) -> Result<Option<HashRecord>, Error> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM hash_record \
             WHERE path = ?1 AND last_write_utc >= ?2 AND {} \
             LIMIT 1",
            segment_constraint(segment_length, 3)
        );

        let result = if segment_length == 0 {
            conn.query_row(&sql, params![path, min_last_write_utc], row_to_record)
        } else {
            conn.query_row(
                &sql,
                params![path, min_last_write_utc, segment_length as i64],
                row_to_record,
            )
        };

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn load_directory(
        &self,
        directory_path: &str,
        segment_length: u64,
    ) -> Result<Vec<HashRecord>, Error> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM hash_record \
             WHERE (directory_path = ?1 OR directory_path LIKE ?2) AND {}",
            segment_constraint(segment_length, 3)
        );
        let descendants = format!("{}{}%", directory_path, MAIN_SEPARATOR);

        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = if segment_length == 0 {
            stmt.query_map(params![directory_path, descendants], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(
                params![directory_path, descendants, segment_length as i64],
                row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        debug!(
            "Loaded {} cached rows under {} at segment {}",
            rows.len(),
            directory_path,
            segment_length
        );
        Ok(rows)
    }

    fn group_by_fingerprint(
        &self,
        segment_length: u64,
        path_prefix: Option<&str>,
    ) -> Result<Vec<Vec<HashRecord>>, Error> {
        let conn = self.connection()?;

        let mut params: Vec<Value> = Vec::new();
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM hash_record WHERE ");

        if segment_length == 0 {
            sql.push_str("(segment_length = 0 OR data_length <= 2 * segment_length)");
        } else {
            params.push(Value::Integer(segment_length as i64));
            sql.push_str(
                "(segment_length = ?1 OR (segment_length = 0 AND data_length <= 2 * ?1))",
            );
        }

        if let Some(prefix) = path_prefix {
            let a = params.len() + 1;
            let b = params.len() + 2;
            sql.push_str(&format!(" AND (path = ?{a} OR path LIKE ?{b})"));
            params.push(Value::Text(prefix.to_string()));
            params.push(Value::Text(format!("{}{}%", prefix, MAIN_SEPARATOR)));
        }

        sql.push_str(" ORDER BY fingerprint, path");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut groups: Vec<Vec<HashRecord>> = Vec::new();
        for record in rows {
            match groups.last_mut() {
                Some(group) if group[0].fingerprint == record.fingerprint => group.push(record),
                _ => groups.push(vec![record]),
            }
        }
        Ok(groups)
    }

    fn upsert(&self, record: &HashRecord) -> Result<(), Error> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO hash_record \
             (uuid, path, directory_path, is_directory, segment_length, data_length, \
              fingerprint, last_write_utc, hash_time_utc) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(uuid) DO UPDATE SET \
                 directory_path = excluded.directory_path, \
                 is_directory = excluded.is_directory, \
                 data_length = excluded.data_length, \
                 fingerprint = excluded.fingerprint, \
                 last_write_utc = excluded.last_write_utc, \
                 hash_time_utc = excluded.hash_time_utc",
        )?;
        stmt.execute(params![
            record.uuid(),
            record.path,
            record.directory_path,
            record.is_directory,
            record.segment_length as i64,
            record.data_length as i64,
            record.fingerprint.as_bytes(),
            record.last_write_utc,
            record.hash_time_utc.to_rfc3339(),
        ])?;
        Ok(())
    }
}
