use chrono::Utc;
use quorum_models::cache_schema::{CacheRow, CACHE_TABLE_DDL};
use rusqlite::{Connection, OpenFlags, Row};

use crate::error::CacheError;

const SELECT_COLUMNS: &str =
    "SELECT key, category, value_json, source, symbol, created_at, expires_at, updated_at \
     FROM cache_entries";

/// Read-only view of the shared SQLite cache.
///
/// Pipelines own the file; QUORUM opens it read-only and filters out expired
/// rows in every query.
pub struct SqliteReader {
    conn: Connection,
}

impl SqliteReader {
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| CacheError::Open {
            path: path.to_string(),
            source,
        })?;
        Ok(Self { conn })
    }

    /// Writable in-memory database with the schema applied, for tests and demos.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Single live entry by key.
    pub fn get(&self, key: &str) -> Result<Option<CacheRow>, CacheError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{SELECT_COLUMNS} WHERE key = ?1 AND expires_at > ?2"))?;

        match stmt.query_row(rusqlite::params![key, now()], map_row) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::Query(e)),
        }
    }

    /// Live entries tagged with `symbol`, ordered by key.
    pub fn get_by_symbol(&self, symbol: &str) -> Result<Vec<CacheRow>, CacheError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE symbol = ?1 AND expires_at > ?2 ORDER BY key"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![symbol, now()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Live entries whose key starts with `prefix`, ordered by key.
    pub fn get_by_prefix(&self, prefix: &str) -> Result<Vec<CacheRow>, CacheError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2 ORDER BY key"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![prefix, now()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Upsert a row. Only usable on a writable connection such as
    /// [`SqliteReader::open_in_memory`].
    pub fn insert(&self, row: &CacheRow) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, category, value_json, source, symbol, created_at, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                row.key,
                row.category,
                row.value_json,
                row.source,
                row.symbol,
                row.created_at,
                row.expires_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    Ok(CacheRow {
        key: row.get(0)?,
        category: row.get(1)?,
        value_json: row.get(2)?,
        source: row.get(3)?,
        symbol: row.get(4)?,
        created_at: row.get(5)?,
        expires_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
