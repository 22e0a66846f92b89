//! Query construction and execution.
//!
//! Provides:
//! - [`arguments`]: the generic argument map and its resolution
//! - SELECT statement assembly with count projections and limit clauses
//! - Row materialization into [`QueryResult`]

pub mod arguments;

pub use arguments::{resolve, ArgValue, QueryArguments, ResolvedQuery, SortDirection};

use std::collections::BTreeSet;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::route::Identifier;
use crate::selection::Selection;

/// Projection column that turns a query into a row count.
pub const COUNT_COLUMN: &str = "_count";

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Query argument keys that were applied.
    pub honored_arguments: BTreeSet<&'static str>,
    /// Identifier observers should watch to learn about changes to these rows.
    pub notification_identifier: Identifier,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of `column` in each row.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// The count from a `_count` projection.
    pub fn count(&self) -> Option<i64> {
        match self.value(0, COUNT_COLUMN)? {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Inputs for one SELECT.
#[derive(Debug, Clone, Copy)]
pub struct SelectSpec<'a> {
    pub table: &'a str,
    pub projection: Option<&'a [String]>,
    pub selection: &'a Selection,
    pub sort_order: Option<&'a str>,
    pub limit: Option<&'a str>,
}

impl SelectSpec<'_> {
    /// Render the SELECT statement.
    pub fn to_sql(&self) -> String {
        let columns = match self.projection {
            Some([only]) if only == COUNT_COLUMN => format!("COUNT(*) AS {COUNT_COLUMN}"),
            Some(columns) if !columns.is_empty() => columns.join(", "),
            _ => "*".to_string(),
        };

        let mut sql = format!(
            "SELECT {columns} FROM {} WHERE {}",
            self.table, self.selection.clause
        );
        if let Some(sort) = self.sort_order {
            sql.push_str(" ORDER BY ");
            sql.push_str(sort);
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(limit);
        }
        sql
    }

    /// Run the statement and collect every row.
    pub fn execute(&self, conn: &Connection) -> rusqlite::Result<(Vec<String>, Vec<Vec<Value>>)> {
        let sql = self.to_sql();
        tracing::debug!(sql = %sql, args = ?self.selection.args, "Executing query");

        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();

        let rows = stmt
            .query_map(params_from_iter(self.selection.args.iter()), |row| {
                (0..width).map(|i| row.get::<_, Value>(i)).collect()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((columns, rows))
    }
}
