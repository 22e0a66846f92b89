//! Error taxonomy for the storage core.
//!
//! Failures local to one operation ([`StoreError::OperationFailure`]) are the
//! only ones the alternatives loop recovers from. Everything classified as
//! infrastructure aborts the whole call.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::route::Operation;
use crate::storage::reader::ReaderError;

/// Result alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Error type for every storage operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identifier {0} is unrecognized")]
    UnrecognizedIdentifier(String),

    #[error("identifier {identifier} does not support the operation {operation}")]
    OperationNotAllowed {
        identifier: String,
        operation: Operation,
    },

    #[error("operation {index} failed: {reason}")]
    OperationFailure { index: usize, reason: String },

    #[error("none of the {attempted} alternative batch groups succeeded")]
    NoGroupSucceeded { attempted: usize },

    #[error("Database error: {0}")]
    Infrastructure(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("a write transaction is already open on this thread")]
    TransactionInProgress,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// Classify a SQLite error raised while executing operation `index`.
    ///
    /// Constraint violations, bad SQL and similar are local to the operation.
    /// Errors that say something about the database itself are not.
    pub fn from_operation(index: usize, err: rusqlite::Error) -> Self {
        if is_infrastructure(&err) {
            return Self::Infrastructure(err);
        }
        Self::OperationFailure {
            index,
            reason: err.to_string(),
        }
    }

    /// True for failures the alternatives loop may recover from.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Self::OperationFailure { .. })
    }

    /// True for failures that must abort the caller's transaction outright.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::Pool(_))
    }
}

impl From<ReaderError> for StoreError {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::PoolCreation(e) => Self::Pool(e),
            ReaderError::Database(e) => Self::Infrastructure(e),
        }
    }
}

fn is_infrastructure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::CannotOpen
                | ErrorCode::OutOfMemory
                | ErrorCode::ReadOnly
                | ErrorCode::NotADatabase
                | ErrorCode::FileLockingProtocolFailed
        ),
        rusqlite::Error::InvalidPath(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_constraint_violation_is_operation_failure() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();

        let classified = StoreError::from_operation(2, err);
        assert!(classified.is_operation_failure());
        assert!(matches!(classified, StoreError::OperationFailure { index: 2, .. }));
    }

    #[test]
    fn test_busy_is_infrastructure() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let classified = StoreError::from_operation(0, err);
        assert!(classified.is_infrastructure());
        assert!(!classified.is_operation_failure());
    }
}
