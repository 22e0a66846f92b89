//! Transaction context.
//!
//! A [`Transaction`] is handed to code running inside an open write
//! transaction. It carries the connection and the notification queue of the
//! outer transaction, so nested batches reuse both instead of opening a new
//! transaction (which would deadlock on the single writer connection).

use rusqlite::{params_from_iter, Connection};

use super::batch::{bind_value, BoundValue, ContentValues, Filter, OperationResult, WriteOperation};
use crate::error::StoreError;
use crate::flow::NotificationQueue;
use crate::query::{self, QueryArguments, QueryResult, SelectSpec};
use crate::route::{Identifier, Operation, RouteMatch, RouteTable};
use crate::selection::{self, is_column_name, Selection, ID_COLUMN};

/// An operation whose identifier has been routed and checked.
#[derive(Debug)]
pub(crate) struct PreparedOperation<'op> {
    pub op: &'op WriteOperation,
    pub identifier: Identifier,
    pub route: RouteMatch,
}

/// Route and validate every operation of a group before anything is
/// written.
pub(crate) fn prepare<'op>(
    routes: &dyn RouteTable,
    group: &'op [WriteOperation],
) -> Result<Vec<PreparedOperation<'op>>, StoreError> {
    group
        .iter()
        .enumerate()
        .map(|(index, op)| -> Result<PreparedOperation<'op>, StoreError> {
            let identifier = Identifier::parse(op.identifier())?;
            let route = routes.match_identifier(&identifier)?;
            let verb = match op {
                WriteOperation::Insert { .. } => Operation::Insert,
                WriteOperation::Update { .. } => Operation::Update,
                WriteOperation::Delete { .. } => Operation::Delete,
                WriteOperation::Assert { .. } => Operation::Query,
            };
            route.require(&identifier, verb)?;

            if let Some(values) = op.values() {
                validate_values(index, values)?;
            }
            if let WriteOperation::Update { values, .. } = op {
                if values.is_empty() {
                    return Err(StoreError::InvalidArgument(format!(
                        "operation {index}: update without values"
                    )));
                }
            }
            if let WriteOperation::Assert { filter, .. } = op {
                if filter.expected_count.is_none() {
                    return Err(StoreError::InvalidArgument(format!(
                        "operation {index}: assert without expected_count"
                    )));
                }
            }

            Ok(PreparedOperation {
                op,
                identifier,
                route,
            })
        })
        .collect()
}

fn validate_values(index: usize, values: &ContentValues) -> Result<(), StoreError> {
    for (column, value) in values.iter() {
        if !is_column_name(column) {
            return Err(StoreError::InvalidArgument(format!(
                "operation {index}: invalid column name {column:?}"
            )));
        }
        if let super::batch::ColumnValue::BackReference { back_reference } = value {
            if *back_reference >= index {
                return Err(StoreError::InvalidArgument(format!(
                    "operation {index}: back reference {back_reference} does not precede it"
                )));
            }
        }
    }
    Ok(())
}

/// Context for work inside an open write transaction.
pub struct Transaction<'a> {
    conn: &'a Connection,
    queue: &'a mut NotificationQueue,
    routes: &'a dyn RouteTable,
    next_savepoint: usize,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        conn: &'a Connection,
        queue: &'a mut NotificationQueue,
        routes: &'a dyn RouteTable,
    ) -> Self {
        Self {
            conn,
            queue,
            routes,
            next_savepoint: 0,
        }
    }

    /// Notification nesting depth of the enclosing transaction.
    pub fn depth(&self) -> usize {
        self.queue.depth()
    }

    /// Query within the transaction; sees its uncommitted writes.
    pub fn query(
        &mut self,
        identifier: &str,
        projection: Option<&[String]>,
        args: &QueryArguments,
    ) -> Result<QueryResult, StoreError> {
        run_query(self.routes, self.conn, identifier, projection, args)
    }

    pub fn insert(&mut self, identifier: &str, values: ContentValues) -> Result<Identifier, StoreError> {
        let op = WriteOperation::insert(identifier, values);
        match self.apply_single(&op)? {
            OperationResult::Inserted { identifier, .. } => Ok(identifier),
            OperationResult::Affected { count } => Err(StoreError::OperationFailure {
                index: 0,
                reason: format!("insert reported {count} affected rows instead of a row id"),
            }),
        }
    }

    pub fn update(
        &mut self,
        identifier: &str,
        values: ContentValues,
        selection: Option<&str>,
        selection_args: &[&str],
    ) -> Result<usize, StoreError> {
        let mut op = WriteOperation::update(identifier, values);
        if let Some(selection) = selection {
            op = op.with_selection(selection, selection_args);
        }
        Ok(self.apply_single(&op)?.count())
    }

    pub fn delete(
        &mut self,
        identifier: &str,
        selection: Option<&str>,
        selection_args: &[&str],
    ) -> Result<usize, StoreError> {
        let mut op = WriteOperation::delete(identifier);
        if let Some(selection) = selection {
            op = op.with_selection(selection, selection_args);
        }
        Ok(self.apply_single(&op)?.count())
    }

    /// Insert every row; all or nothing.
    pub fn bulk_insert(&mut self, identifier: &str, rows: &[ContentValues]) -> Result<usize, StoreError> {
        let group: Vec<WriteOperation> = rows
            .iter()
            .map(|values| WriteOperation::insert(identifier, values.clone()))
            .collect();
        Ok(self.apply_batch(&group)?.len())
    }

    /// Apply a group nested in this transaction.
    ///
    /// The group runs in its own savepoint: on failure its effects are
    /// rolled back, the error is returned, and the enclosing transaction
    /// stays usable. Its notification level reports the failure, which
    /// suppresses notifications for the whole outer transaction.
    pub fn apply_batch(&mut self, group: &[WriteOperation]) -> Result<Vec<OperationResult>, StoreError> {
        let prepared = prepare(self.routes, group)?;

        let name = self.savepoint_name();
        savepoint(self.conn, &name)?;
        self.queue.start_batch();

        match self.apply_prepared(&prepared) {
            Ok(results) => match release(self.conn, &name) {
                Ok(()) => {
                    self.queue.end_batch(true);
                    Ok(results)
                }
                Err(err) => {
                    self.queue.end_batch(false);
                    Err(err)
                }
            },
            Err(err) => {
                tracing::debug!(error = %err, savepoint = %name, "Nested batch failed; rolling back");
                let undo = rollback_to(self.conn, &name).and_then(|()| release(self.conn, &name));
                self.queue.end_batch(false);
                undo?;
                Err(err)
            }
        }
    }

    fn apply_single(&mut self, op: &WriteOperation) -> Result<OperationResult, StoreError> {
        let prepared = prepare(self.routes, std::slice::from_ref(op))?;
        let mut results = self.apply_prepared(&prepared)?;
        Ok(results.remove(0))
    }

    /// Run prepared operations in order, stopping at the first failure.
    ///
    /// No rollback happens here; the caller owns the savepoint or
    /// transaction that discards partial effects.
    pub(crate) fn apply_prepared(
        &mut self,
        prepared: &[PreparedOperation<'_>],
    ) -> Result<Vec<OperationResult>, StoreError> {
        let mut results = Vec::with_capacity(prepared.len());
        for (index, item) in prepared.iter().enumerate() {
            let result = self.apply_operation(index, item, &results)?;
            tracing::debug!(index, identifier = %item.identifier, ?result, "Operation applied");
            results.push(result);
        }
        Ok(results)
    }

    fn apply_operation(
        &mut self,
        index: usize,
        item: &PreparedOperation<'_>,
        results: &[OperationResult],
    ) -> Result<OperationResult, StoreError> {
        let PreparedOperation {
            op,
            identifier,
            route,
        } = item;

        let result = match op {
            WriteOperation::Insert { values, .. } => {
                self.execute_insert(index, identifier, route, values, results)?
            }
            WriteOperation::Update { values, filter, .. } => {
                let selection = filter_selection(route, identifier, filter)?;
                let count = self.execute_update(index, route, values, &selection, results)?;
                check_expected(index, filter, count)?;
                OperationResult::Affected { count }
            }
            WriteOperation::Delete { filter, .. } => {
                let selection = filter_selection(route, identifier, filter)?;
                let sql = format!("DELETE FROM {} WHERE {}", route.table_name(), selection.clause);
                let count = self
                    .conn
                    .execute(&sql, params_from_iter(selection.args.iter()))
                    .map_err(|e| StoreError::from_operation(index, e))?;
                check_expected(index, filter, count)?;
                OperationResult::Affected { count }
            }
            WriteOperation::Assert { filter, .. } => {
                let selection = filter_selection(route, identifier, filter)?;
                let sql = format!(
                    "SELECT COUNT(*) FROM {} WHERE {}",
                    route.table_name(),
                    selection.clause
                );
                let count: i64 = self
                    .conn
                    .query_row(&sql, params_from_iter(selection.args.iter()), |row| row.get(0))
                    .map_err(|e| StoreError::from_operation(index, e))?;
                let count = usize::try_from(count).unwrap_or(0);
                check_expected(index, filter, count)?;
                // Asserts change nothing, so they notify nothing.
                return Ok(OperationResult::Affected { count });
            }
        };

        let changed = match &result {
            OperationResult::Inserted { .. } => true,
            OperationResult::Affected { count } => *count > 0,
        };
        if changed && !identifier.is_suppress_notification() {
            self.queue.notify_changed(route.notify_targets().iter().cloned());
        }

        Ok(result)
    }

    fn execute_insert(
        &mut self,
        index: usize,
        identifier: &Identifier,
        route: &RouteMatch,
        values: &ContentValues,
        results: &[OperationResult],
    ) -> Result<OperationResult, StoreError> {
        let mut values = values.clone();
        if route.is_record_identifier() {
            let id = identifier.record_id().ok_or_else(|| {
                StoreError::InvalidArgument(format!("{identifier} does not end in a record id"))
            })?;
            values.insert(ID_COLUMN, id.into());
        }

        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", route.table_name())
        } else {
            let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                route.table_name(),
                columns.join(", ")
            )
        };
        let bound = bind_all(index, &values, results)?;

        self.conn
            .execute(&sql, params_from_iter(bound.iter()))
            .map_err(|e| StoreError::from_operation(index, e))?;
        let id = self.conn.last_insert_rowid();

        Ok(OperationResult::Inserted {
            identifier: route.base_identifier().with_appended_id(id),
            id,
        })
    }

    fn execute_update(
        &mut self,
        index: usize,
        route: &RouteMatch,
        values: &ContentValues,
        selection: &Selection,
        results: &[OperationResult],
    ) -> Result<usize, StoreError> {
        let assignments: Vec<String> = values.iter().map(|(c, _)| format!("{c} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            route.table_name(),
            assignments.join(", "),
            selection.clause
        );

        let mut params = bind_all(index, values, results)?;
        params.extend(
            selection
                .args
                .iter()
                .map(|arg| BoundValue(rusqlite::types::Value::Text(arg.clone()))),
        );

        self.conn
            .execute(&sql, params_from_iter(params.iter()))
            .map_err(|e| StoreError::from_operation(index, e))
    }

    fn savepoint_name(&mut self) -> String {
        let name = format!("rowgate_nested_{}", self.next_savepoint);
        self.next_savepoint += 1;
        name
    }
}

/// Run a query on `conn`, routed through `routes`.
pub(crate) fn run_query(
    routes: &dyn RouteTable,
    conn: &Connection,
    identifier: &str,
    projection: Option<&[String]>,
    args: &QueryArguments,
) -> Result<QueryResult, StoreError> {
    let identifier = Identifier::parse(identifier)?;
    let route = routes.match_identifier(&identifier)?;
    route.require(&identifier, Operation::Query)?;
    if let Some(column) = projection
        .into_iter()
        .flatten()
        .find(|column| !is_column_name(column))
    {
        return Err(StoreError::InvalidArgument(format!(
            "invalid projection column {column:?}"
        )));
    }

    let resolved = query::resolve(
        args,
        identifier.query_parameter(crate::route::identifier::QUERY_PARAM_LIMIT),
    );
    let selection = selection::build(
        &route,
        &identifier,
        resolved.selection.as_deref(),
        &resolved.selection_args,
    )?;

    let spec = SelectSpec {
        table: route.table_name(),
        projection,
        selection: &selection,
        sort_order: resolved.sort_order.as_deref(),
        limit: resolved.limit.as_deref(),
    };
    let (columns, rows) = spec.execute(conn)?;

    Ok(QueryResult {
        columns,
        rows,
        honored_arguments: resolved.honored,
        notification_identifier: route.base_identifier().clone(),
    })
}

fn filter_selection(
    route: &RouteMatch,
    identifier: &Identifier,
    filter: &Filter,
) -> Result<Selection, StoreError> {
    selection::build(
        route,
        identifier,
        filter.selection.as_deref(),
        &filter.selection_args,
    )
}

fn check_expected(index: usize, filter: &Filter, count: usize) -> Result<(), StoreError> {
    match filter.expected_count {
        Some(expected) if expected != count => Err(StoreError::OperationFailure {
            index,
            reason: format!("wrong number of rows: expected {expected}, got {count}"),
        }),
        _ => Ok(()),
    }
}

fn bind_all(
    index: usize,
    values: &ContentValues,
    results: &[OperationResult],
) -> Result<Vec<BoundValue>, StoreError> {
    values
        .iter()
        .map(|(_, value)| bind_value(index, value, results))
        .collect()
}

pub(crate) fn savepoint(conn: &Connection, name: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    Ok(())
}

pub(crate) fn release(conn: &Connection, name: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!("RELEASE {name}"))?;
    Ok(())
}

pub(crate) fn rollback_to(conn: &Connection, name: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!("ROLLBACK TO {name}"))?;
    Ok(())
}
