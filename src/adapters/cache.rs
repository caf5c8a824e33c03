//! Durable side-index of previously published feed messages.
//!
//! Rows are keyed by `asset.name` and carry a parent-linkage key so that all
//! children of a deleted parent can be recovered after the live directory
//! has forgotten them.
//!
//! Delivery order is not guaranteed, so every write carries the message's
//! `window.startTime` and never overrides a row written from a later event.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

/// Errors from the cache store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Cache connection lock poisoned")]
    Poisoned,
}

/// A stored row, exactly as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRow {
    pub name: String,
    /// Serialized feed message
    pub data: String,
    /// RFC 3339 timestamp of the last write
    pub cached_at: String,
}

/// A row to write
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub name: String,
    pub asset_type: String,
    pub parent_key: Option<String>,
    pub data: String,
    /// `window.startTime` of the message
    pub start_time: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

/// Trait for the side-index
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Rows of `asset_type` linked to `parent_key`, ordered by name,
    /// starting strictly after `after`
    async fn query_page(
        &self,
        asset_type: &str,
        parent_key: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CachedRow>, CacheError>;

    /// Insert or replace the row for `record.name`, unless the stored row
    /// comes from a later event. Returns whether the write was applied.
    async fn upsert(&self, record: CacheRecord) -> Result<bool, CacheError>;

    /// Remove a row unless it comes from an event later than `start_time`.
    /// Returns whether a row was removed.
    async fn delete(&self, name: &str, start_time: DateTime<Utc>) -> Result<bool, CacheError>;
}

/// Normalize a parent key for storage and lookup
///
/// Email-like keys are case-insensitive upstream.
pub fn normalize_parent_key(key: &str) -> String {
    key.trim().to_lowercase()
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS assets (
    name TEXT PRIMARY KEY,
    asset_type TEXT NOT NULL,
    parent_key TEXT,
    data TEXT NOT NULL,
    start_time_micros INTEGER NOT NULL,
    cached_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS assets_by_parent ON assets (asset_type, parent_key, name);
";

/// SQLite-backed cache store
#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open (and create if needed) a cache file
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory cache
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection
    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| CacheError::Poisoned)?;
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn query_page(
        &self,
        asset_type: &str,
        parent_key: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CachedRow>, CacheError> {
        let asset_type = asset_type.to_string();
        let parent_key = parent_key.to_string();
        let after = after.unwrap_or_default().to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT name, data, cached_at FROM assets
                 WHERE asset_type = ?1 AND parent_key = ?2 AND name > ?3
                 ORDER BY name
                 LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(params![asset_type, parent_key, after, i64::from(limit)], |row| {
                    Ok(CachedRow {
                        name: row.get(0)?,
                        data: row.get(1)?,
                        cached_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
        .await
    }

    async fn upsert(&self, record: CacheRecord) -> Result<bool, CacheError> {
        self.with_conn(move |conn| {
            let written = conn.execute(
                "INSERT INTO assets (name, asset_type, parent_key, data, start_time_micros, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(name) DO UPDATE SET
                    asset_type = excluded.asset_type,
                    parent_key = excluded.parent_key,
                    data = excluded.data,
                    start_time_micros = excluded.start_time_micros,
                    cached_at = excluded.cached_at
                 WHERE excluded.start_time_micros >= assets.start_time_micros",
                params![
                    record.name,
                    record.asset_type,
                    record.parent_key,
                    record.data,
                    record.start_time.timestamp_micros(),
                    record.cached_at.to_rfc3339(),
                ],
            )?;
            Ok(written > 0)
        })
        .await
    }

    async fn delete(&self, name: &str, start_time: DateTime<Utc>) -> Result<bool, CacheError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM assets WHERE name = ?1 AND start_time_micros <= ?2",
                params![name, start_time.timestamp_micros()],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
