//! Transactional SQLite storage.
//!
//! All engine writes run through [`ArenaStore::write`], which opens a
//! `BEGIN IMMEDIATE` transaction, hands it to the closure, and commits only
//! when the closure returns `Ok`. Any error drops the transaction, which
//! rolls every write back.

pub mod records;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Shared handle to the betting database.
#[derive(Debug, Clone)]
pub struct ArenaStore {
    conn: Arc<Mutex<Connection>>,
}

impl ArenaStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &str, busy_timeout: Duration) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags)?;
        // Other processes may hold the write lock; wait instead of failing fast.
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(schema::PRAGMAS_SQL)?;

        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .unwrap_or_default();
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!(journal_mode = %journal_mode, "WAL mode not active");
        }

        info!(path = %path, "Opened betting database");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(schema::SCHEMA_SQL)?;
        debug!("Schema ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside one immediate write transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back otherwise.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| E::from(StoreError::from(e)))?;

        let value = f(&tx)?;

        tx.commit().map_err(|e| E::from(StoreError::from(e)))?;
        Ok(value)
    }

    /// Run a read-only closure against the connection.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }
}
