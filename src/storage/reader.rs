//! Read connection pool for queries issued outside a transaction.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access.
//! SQLite WAL mode lets these readers run alongside the writer.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use thiserror::Error;

use super::schema::apply_reader_pragmas;

/// Error type for reader pool operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to create connection pool: {0}")]
    PoolCreation(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Pool of read-only connections.
///
/// Connections are opened lazily, so a pool costs nothing until the first
/// query that runs outside a write transaction.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReaderPool {
    /// Create a reader pool over an existing database file.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to an existing SQLite database file
    /// * `max_size` - Maximum number of connections in the pool
    pub fn new<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self, ReaderError> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(0))
            .connection_customizer(Box::new(QueryOnly))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Check out a connection, blocking until one is free.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, ReaderError> {
        Ok(self.pool.get()?)
    }

    /// Run `f` on a pooled connection and return it to the pool.
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<ReaderError>,
        F: FnOnce(&Connection) -> Result<T, E>,
    {
        let conn = self.get()?;
        f(&conn)
    }

    pub fn max_size(&self) -> u32 {
        self.pool.max_size()
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }
}

impl std::fmt::Debug for ReaderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("ReaderPool")
            .field("max_size", &self.pool.max_size())
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

/// Marks every pooled connection `query_only` on checkout.
#[derive(Debug)]
struct QueryOnly;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for QueryOnly {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn)
    }
}
