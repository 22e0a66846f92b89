//! Routed table provider.
//!
//! Provides:
//! - [`Provider`], the entry point for queries and writes on routed tables
//! - Plain batches, alternatives batches and closure transactions
//! - Change notification delivery after commit
//!
//! Every write runs inside one `BEGIN IMMEDIATE` transaction on the shared
//! writer connection. The transaction's [`NotificationQueue`] coalesces the
//! notify targets of every effective change and delivers them once, after
//! the commit and after the writer lock has been released.

pub mod batch;
pub mod transaction;

pub use batch::{
    AlternativesOutcome, BatchGroup, ColumnValue, ContentValues, Filter, OperationResult,
    WriteOperation,
};
pub use transaction::Transaction;

use std::sync::Arc;

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::error::StoreError;
use crate::flow::{NotificationQueue, NotificationSink, NullSink};
use crate::query::{QueryArguments, QueryResult};
use crate::route::{Identifier, RouteTable};
use crate::storage::Database;
use transaction::{prepare, release, rollback_to, run_query, savepoint, PreparedOperation};

const OUTER_SAVEPOINT: &str = "rowgate_alternatives";
const GROUP_SAVEPOINT: &str = "rowgate_group";

/// Routed access to the tables of one database.
pub struct Provider<R> {
    db: Database,
    routes: R,
    sink: Arc<dyn NotificationSink>,
}

impl<R: RouteTable> Provider<R> {
    /// Create a provider that discards notifications.
    pub fn new(db: Database, routes: R) -> Self {
        Self::with_sink(db, routes, Arc::new(NullSink))
    }

    /// Create a provider that delivers notifications to `sink`.
    pub fn with_sink(db: Database, routes: R, sink: Arc<dyn NotificationSink>) -> Self {
        Self { db, routes, sink }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn routes(&self) -> &R {
        &self.routes
    }

    /// Content type of the route matching `identifier`.
    pub fn content_type(&self, identifier: &str) -> Option<String> {
        let identifier = Identifier::parse(identifier).ok()?;
        self.routes
            .match_identifier(&identifier)
            .ok()
            .map(|route| route.content_type().to_string())
    }

    /// Query outside a transaction, on a reader connection.
    ///
    /// A `limit` query parameter on the identifier is honored unless the
    /// arguments carry their own `limit`.
    pub fn query(
        &self,
        identifier: &str,
        projection: Option<&[String]>,
        args: &QueryArguments,
    ) -> Result<QueryResult, StoreError> {
        self.db
            .read(|conn| run_query(&self.routes, conn, identifier, projection, args))
    }

    /// Insert one row, returning the identifier of the new record.
    pub fn insert(&self, identifier: &str, values: ContentValues) -> Result<Identifier, StoreError> {
        self.run_in_transaction(|tx| tx.insert(identifier, values))
    }

    /// Update matching rows, returning how many changed.
    pub fn update(
        &self,
        identifier: &str,
        values: ContentValues,
        selection: Option<&str>,
        selection_args: &[&str],
    ) -> Result<usize, StoreError> {
        self.run_in_transaction(|tx| tx.update(identifier, values, selection, selection_args))
    }

    /// Delete matching rows, returning how many were removed.
    pub fn delete(
        &self,
        identifier: &str,
        selection: Option<&str>,
        selection_args: &[&str],
    ) -> Result<usize, StoreError> {
        self.run_in_transaction(|tx| tx.delete(identifier, selection, selection_args))
    }

    /// Insert every row in one transaction.
    pub fn bulk_insert(&self, identifier: &str, rows: &[ContentValues]) -> Result<usize, StoreError> {
        self.run_in_transaction(|tx| tx.bulk_insert(identifier, rows))
    }

    /// Apply one group atomically.
    pub fn apply_batch(&self, group: &[WriteOperation]) -> Result<Vec<OperationResult>, StoreError> {
        self.run_in_transaction(|tx| tx.apply_batch(group))
    }

    /// Run `f` in one write transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. Work nested
    /// inside goes through the [`Transaction`] handed to `f`; calling back
    /// into the provider's write methods from `f` fails with
    /// [`StoreError::TransactionInProgress`].
    pub fn run_in_transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.db.writer()?;
        let mut queue = NotificationQueue::new(Arc::clone(&self.sink));
        queue.start_batch();

        let outcome = self.execute(&mut conn, &mut queue, f);
        if let Err(err) = &outcome {
            tracing::debug!(error = %err, "Transaction rolled back");
        }

        drop(conn);
        queue.end_batch(outcome.is_ok());
        outcome
    }

    /// Apply the first group that succeeds in full.
    ///
    /// Groups run in order, each inside its own savepoint. A group failing
    /// with [`StoreError::OperationFailure`] is rolled back and the next one
    /// is tried; any other error aborts the call. At most one group is
    /// committed, and nothing is when every group fails.
    ///
    /// Every group is routed and validated before the first one runs.
    /// Each group collects its own change set; only the committed group's
    /// set is delivered, after the writer is released.
    pub fn apply_alternatives(&self, groups: &[BatchGroup]) -> Result<AlternativesOutcome, StoreError> {
        let prepared = groups
            .iter()
            .map(|group| prepare(&self.routes, group))
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.db.writer()?;
        let mut queue = NotificationQueue::new(Arc::clone(&self.sink));

        let outcome = self.run_alternatives(&mut conn, &mut queue, &prepared);

        // Only the committed group is still open on the queue.
        drop(conn);
        if queue.is_batch() {
            queue.end_batch(outcome.is_ok());
        }
        outcome
    }

    fn execute<T, F>(
        &self,
        conn: &mut Connection,
        queue: &mut NotificationQueue,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, StoreError>,
    {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&mut Transaction::new(&tx, queue, &self.routes))?;
        tx.commit()?;
        Ok(value)
    }

    fn run_alternatives(
        &self,
        conn: &mut Connection,
        queue: &mut NotificationQueue,
        groups: &[Vec<PreparedOperation<'_>>],
    ) -> Result<AlternativesOutcome, StoreError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        savepoint(&tx, OUTER_SAVEPOINT)?;

        for (index, group) in groups.iter().enumerate() {
            savepoint(&tx, GROUP_SAVEPOINT)?;
            queue.start_batch();

            let attempt = Transaction::new(&tx, queue, &self.routes).apply_prepared(group);
            match attempt {
                Ok(results) => {
                    if let Err(err) = commit_group(tx) {
                        queue.end_batch(false);
                        return Err(err);
                    }

                    tracing::debug!(index, operations = results.len(), "Alternative committed");
                    return Ok(AlternativesOutcome { index, results });
                }
                Err(err) if err.is_operation_failure() => {
                    tracing::debug!(index, error = %err, "Alternative failed; trying next");
                    let undo = rollback_to(&tx, GROUP_SAVEPOINT)
                        .and_then(|()| release(&tx, GROUP_SAVEPOINT));
                    queue.end_batch(false);
                    undo?;
                }
                Err(err) => {
                    queue.end_batch(false);
                    return Err(err);
                }
            }
        }

        tx.rollback()?;
        tracing::debug!(attempted = groups.len(), "No alternative succeeded");
        Err(StoreError::NoGroupSucceeded {
            attempted: groups.len(),
        })
    }
}

impl<R> std::fmt::Debug for Provider<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").field("db", &self.db).finish_non_exhaustive()
    }
}

fn commit_group(tx: SqlTransaction<'_>) -> Result<(), StoreError> {
    release(&tx, GROUP_SAVEPOINT)?;
    release(&tx, OUTER_SAVEPOINT)?;
    tx.commit()?;
    Ok(())
}
