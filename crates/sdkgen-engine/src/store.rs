//! Persistent cache store: one SQLite file guarded by an advisory file lock.
//!
//! Readers take the lock shared, writers exclusive, so two processes sharing
//! a cache directory serialize at the lock rather than corrupting the
//! database. The lock is advisory; on filesystems without lock support,
//! cross-process sharing must be disabled instead.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};

use crate::hash::CacheKey;
use crate::output::QueryOutput;

const DB_FILE: &str = "cache.db";
const LOCK_FILE: &str = "cache.lock";

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open cache database at {path}: {source}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cache query failed: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("cache record is corrupt: {0}")]
    CorruptRecord(#[from] serde_json::Error),

    #[error("failed to lock cache directory {path}: {source}")]
    Lock {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub output: QueryOutput,
    pub created_at: DateTime<Utc>,
}

/// Handle on the cache directory. Cheap to clone; each operation opens the
/// database and takes the file lock for its own duration.
#[derive(Debug, Clone)]
pub struct CacheIndex {
    db_path: Utf8PathBuf,
    lock_path: Utf8PathBuf,
}

impl CacheIndex {
    /// Open (and initialize, if needed) the store under `cache_dir`.
    pub fn open(cache_dir: &Utf8Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(cache_dir.as_std_path()).map_err(|source| StoreError::Lock {
            path: cache_dir.to_owned(),
            source,
        })?;
        let index = Self {
            db_path: cache_dir.join(DB_FILE),
            lock_path: cache_dir.join(LOCK_FILE),
        };
        let mut lock = index.lock_handle()?;
        let _guard = lock.write().map_err(|source| StoreError::Lock {
            path: index.lock_path.clone(),
            source,
        })?;
        let conn = index.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (key BLOB PRIMARY KEY, value BLOB NOT NULL)",
            [],
        )?;
        Ok(index)
    }

    fn lock_handle(&self) -> Result<fd_lock::RwLock<File>, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path.as_std_path())
            .map_err(|source| StoreError::Lock {
                path: self.lock_path.clone(),
                source,
            })?;
        Ok(fd_lock::RwLock::new(file))
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Connection::open(self.db_path.as_std_path()).map_err(|source| StoreError::Open {
            path: self.db_path.clone(),
            source,
        })
    }

    /// Look up a record. Takes the lock shared.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>, StoreError> {
        let mut lock = self.lock_handle()?;
        let _guard = lock.read().map_err(|source| StoreError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;
        let conn = self.connect()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a record. Takes the lock exclusively; the write is
    /// transactional, so an interrupted process leaves the old state intact.
    pub fn insert(&self, key: &CacheKey, output: &QueryOutput) -> Result<(), StoreError> {
        let record = CacheRecord {
            output: output.clone(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record)?;
        let mut lock = self.lock_handle()?;
        let _guard = lock.write().map_err(|source| StoreError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value) VALUES (?1, ?2)",
            params![key.as_bytes().as_slice(), bytes],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a record (read-time eviction of stale artifacts).
    pub fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
        let mut lock = self.lock_handle()?;
        let _guard = lock.write().map_err(|source| StoreError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1",
            params![key.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    /// Number of stored records; used by tests and diagnostics.
    pub fn len(&self) -> Result<usize, StoreError> {
        let mut lock = self.lock_handle()?;
        let _guard = lock.read().map_err(|source| StoreError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
