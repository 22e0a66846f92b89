//! Shared database handle.
//!
//! One writer connection behind a mutex (single-writer discipline) plus an
//! optional pool of read-only connections for queries that run outside a
//! transaction. In-memory databases have no pool; their reads go through
//! the writer.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use rusqlite::Connection;

use super::reader::ReaderPool;
use super::schema::{apply_pragmas, initialize_schema};
use crate::error::StoreError;

/// Default number of pooled reader connections.
pub const DEFAULT_READER_POOL_SIZE: u32 = 4;

/// Writer connection plus reader pool.
#[derive(Debug)]
pub struct Database {
    writer: Mutex<Connection>,
    /// Thread currently holding the writer.
    owner: Mutex<Option<ThreadId>>,
    readers: Option<ReaderPool>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, reader_pool_size: u32) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        apply_pragmas(&conn)?;

        let readers = if reader_pool_size > 0 {
            Some(ReaderPool::new(&path, reader_pool_size)?)
        } else {
            None
        };

        tracing::info!(path = %path.display(), reader_pool_size, "Database opened");

        Ok(Self {
            writer: Mutex::new(conn),
            owner: Mutex::new(None),
            readers,
            path: Some(path),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            writer: Mutex::new(conn),
            owner: Mutex::new(None),
            readers: None,
            path: None,
        })
    }

    /// Path of the database file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run schema statements on the writer.
    pub fn initialize_schema<S: AsRef<str>>(&self, statements: &[S]) -> Result<(), StoreError> {
        let mut conn = self.writer()?;
        initialize_schema(&mut conn, statements)?;
        Ok(())
    }

    /// Lock the writer connection.
    ///
    /// Blocks while another thread holds a write transaction. Fails with
    /// [`StoreError::TransactionInProgress`] when the calling thread already
    /// holds it, which would otherwise deadlock.
    ///
    /// A writer poisoned by a panicking transaction is taken over; any
    /// transaction still open on it is rolled back first.
    pub fn writer(&self) -> Result<WriterGuard<'_>, StoreError> {
        let current = thread::current().id();
        if *lock_owner(&self.owner) == Some(current) {
            return Err(StoreError::TransactionInProgress);
        }

        let conn = match self.writer.lock() {
            Ok(conn) => conn,
            Err(poisoned) => {
                let conn = poisoned.into_inner();
                tracing::warn!("Writer connection recovered after a panic");
                if !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK")?;
                }
                self.writer.clear_poison();
                conn
            }
        };
        *lock_owner(&self.owner) = Some(current);

        Ok(WriterGuard {
            conn,
            owner: &self.owner,
        })
    }

    /// Run `f` on a read connection.
    pub fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        match &self.readers {
            Some(pool) => pool.with_connection(f),
            None => {
                let conn = self.writer()?;
                f(&*conn)
            }
        }
    }
}

/// Exclusive access to the writer connection.
#[derive(Debug)]
pub struct WriterGuard<'a> {
    conn: MutexGuard<'a, Connection>,
    owner: &'a Mutex<Option<ThreadId>>,
}

impl Deref for WriterGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for WriterGuard<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        *lock_owner(self.owner) = None;
    }
}

fn lock_owner(owner: &Mutex<Option<ThreadId>>) -> MutexGuard<'_, Option<ThreadId>> {
    owner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_database_reads_through_pool() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("test.db"), 2).unwrap();
        db.initialize_schema(&["CREATE TABLE IF NOT EXISTS t (x INTEGER)"])
            .unwrap();
        db.writer()
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_in_memory_database_reads_through_writer() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());
        db.initialize_schema(&["CREATE TABLE t (x INTEGER)"]).unwrap();

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_reentrant_writer_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let _held = db.writer().unwrap();

        let err = db.writer().unwrap_err();
        assert!(matches!(err, StoreError::TransactionInProgress));
    }

    #[test]
    fn test_writer_recovers_after_panic() {
        let db = Database::open_in_memory().unwrap();
        db.initialize_schema(&["CREATE TABLE t (x INTEGER)"]).unwrap();

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let conn = db.writer().unwrap();
            conn.execute_batch("BEGIN; INSERT INTO t VALUES (1);").unwrap();
            panic!("transaction body panicked");
        }));
        assert!(panicked.is_err());

        let conn = db.writer().unwrap();
        assert!(conn.is_autocommit());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_writer_released_on_drop() {
        let db = Database::open_in_memory().unwrap();
        drop(db.writer().unwrap());
        assert!(db.writer().is_ok());
    }
}
