pub mod cache;
pub mod cascade;
pub mod config;
pub mod error;
pub mod history;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notify;
pub mod threads;
pub mod users;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use messages::{Delivery, EditOutcome};

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

use crate::cache::QueryCache;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Entity store with reader/writer split.
///
/// All writes go through the single writer connection inside an immediate
/// transaction, so every row has exactly one writer at a time. Reads are
/// spread round-robin over read-only connections and see committed data only.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
    cache: QueryCache,
    config: StoreConfig,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, StoreConfig::default())
    }

    pub fn open_with(path: &Path, config: StoreConfig) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.busy_timeout(BUSY_TIMEOUT)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(config.reader_pool_size);
        for _ in 0..config.reader_pool_size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            readers.len()
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
            cache: QueryCache::new(config.cache_capacity),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Run a read against a pooled reader. Falls back to the writer when the
    /// pool is empty.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            return self.with_conn_mut(f);
        }
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| Error::LockPoisoned(format!("reader: {}", e)))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| Error::LockPoisoned(format!("writer: {}", e)))?;
        f(&conn)
    }

    /// Run `f` as one atomic unit on the writer connection.
    ///
    /// Any error returned by `f` drops the transaction, which rolls back every
    /// write it made. A failed commit is reported as an integrity violation.
    pub(crate) fn atomic<F, T>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| Error::LockPoisoned(format!("writer: {}", e)))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|source| Error::Integrity { operation, source })?;
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parley_types::models::User;
    use parley_types::api::NewUser;
    use tempfile::TempDir;

    pub fn open() -> (TempDir, Database) {
        open_with(StoreConfig::default())
    }

    pub fn open_with(config: StoreConfig) -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_with(&dir.path().join("parley.db"), config).unwrap();
        (dir, db)
    }

    pub fn user(db: &Database, name: &str) -> User {
        db.create_user(&NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
        })
        .unwrap()
    }
}
