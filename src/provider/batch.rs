//! Write operations and batch groups.
//!
//! A [`BatchGroup`] is an ordered list of [`WriteOperation`]s that succeed or
//! fail together. Operations may carry an expected affected-row count and
//! may reference results of earlier operations in the same group.

use std::collections::BTreeMap;

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::route::Identifier;

/// Operations that succeed or fail together.
pub type BatchGroup = Vec<WriteOperation>;

/// A column value, or a reference to an earlier result in the same group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Row id of an earlier insert, or affected count of an earlier
    /// update or delete.
    BackReference { back_reference: usize },
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Column name to value map for inserts and updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentValues(BTreeMap<String, ColumnValue>);

impl ContentValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`, returning `self` for chaining.
    pub fn put(mut self, column: &str, value: impl Into<ColumnValue>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    /// Set `column` to the result of operation `index` in the same group.
    pub fn put_back_reference(mut self, column: &str, index: usize) -> Self {
        self.0.insert(
            column.to_string(),
            ColumnValue::BackReference {
                back_reference: index,
            },
        );
        self
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.0.get(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ColumnValue)> {
        self.0.iter()
    }

    pub(crate) fn insert(&mut self, column: &str, value: ColumnValue) {
        self.0.insert(column.to_string(), value);
    }
}

/// Filter shared by update, delete and assert operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub selection: Option<String>,
    #[serde(default)]
    pub selection_args: Vec<String>,
    #[serde(default)]
    pub expected_count: Option<usize>,
}

/// One write inside a batch group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOperation {
    Insert {
        identifier: String,
        values: ContentValues,
    },
    Update {
        identifier: String,
        values: ContentValues,
        #[serde(flatten)]
        filter: Filter,
    },
    Delete {
        identifier: String,
        #[serde(flatten)]
        filter: Filter,
    },
    /// Count matching rows and fail unless the count is as expected.
    Assert {
        identifier: String,
        #[serde(flatten)]
        filter: Filter,
    },
}

impl WriteOperation {
    pub fn insert(identifier: &str, values: ContentValues) -> Self {
        Self::Insert {
            identifier: identifier.to_string(),
            values,
        }
    }

    pub fn update(identifier: &str, values: ContentValues) -> Self {
        Self::Update {
            identifier: identifier.to_string(),
            values,
            filter: Filter::default(),
        }
    }

    pub fn delete(identifier: &str) -> Self {
        Self::Delete {
            identifier: identifier.to_string(),
            filter: Filter::default(),
        }
    }

    pub fn assert_count(identifier: &str, expected_count: usize) -> Self {
        Self::Assert {
            identifier: identifier.to_string(),
            filter: Filter {
                expected_count: Some(expected_count),
                ..Filter::default()
            },
        }
    }

    /// Restrict an update, delete or assert. No effect on inserts.
    pub fn with_selection(mut self, selection: &str, args: &[&str]) -> Self {
        if let Some(filter) = self.filter_mut() {
            filter.selection = Some(selection.to_string());
            filter.selection_args = args.iter().map(|a| (*a).to_string()).collect();
        }
        self
    }

    /// Require exactly `count` affected rows. No effect on inserts.
    pub fn with_expected_count(mut self, count: usize) -> Self {
        if let Some(filter) = self.filter_mut() {
            filter.expected_count = Some(count);
        }
        self
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::Insert { identifier, .. }
            | Self::Update { identifier, .. }
            | Self::Delete { identifier, .. }
            | Self::Assert { identifier, .. } => identifier,
        }
    }

    pub fn values(&self) -> Option<&ContentValues> {
        match self {
            Self::Insert { values, .. } | Self::Update { values, .. } => Some(values),
            Self::Delete { .. } | Self::Assert { .. } => None,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            Self::Insert { .. } => None,
            Self::Update { filter, .. } | Self::Delete { filter, .. } | Self::Assert { filter, .. } => {
                Some(filter)
            }
        }
    }

    fn filter_mut(&mut self) -> Option<&mut Filter> {
        match self {
            Self::Insert { .. } => None,
            Self::Update { filter, .. } | Self::Delete { filter, .. } | Self::Assert { filter, .. } => {
                Some(filter)
            }
        }
    }
}

/// Outcome of one successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Inserted {
        #[serde(serialize_with = "serialize_identifier")]
        identifier: Identifier,
        id: i64,
    },
    Affected {
        count: usize,
    },
}

impl OperationResult {
    /// Value substituted for a back reference to this result.
    pub fn back_reference_value(&self) -> i64 {
        match self {
            Self::Inserted { id, .. } => *id,
            Self::Affected { count } => i64::try_from(*count).unwrap_or(i64::MAX),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Inserted { .. } => 1,
            Self::Affected { count } => *count,
        }
    }
}

fn serialize_identifier<S: serde::Serializer>(identifier: &Identifier, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(identifier)
}

/// Winning group of an alternatives batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternativesOutcome {
    /// Position of the group that was committed.
    pub index: usize,
    pub results: Vec<OperationResult>,
}

/// A column value with back references already substituted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundValue(pub Value);

impl ToSql for BoundValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::from(&self.0)))
    }
}

/// Substitute back references in `value` from `results`.
pub(crate) fn bind_value(
    index: usize,
    value: &ColumnValue,
    results: &[OperationResult],
) -> Result<BoundValue, StoreError> {
    let value = match value {
        ColumnValue::Null => Value::Null,
        ColumnValue::Integer(n) => Value::Integer(*n),
        ColumnValue::Real(r) => Value::Real(*r),
        ColumnValue::Text(t) => Value::Text(t.clone()),
        ColumnValue::Blob(b) => Value::Blob(b.clone()),
        ColumnValue::BackReference { back_reference } => {
            let result = results.get(*back_reference).ok_or_else(|| StoreError::OperationFailure {
                index,
                reason: format!("back reference {back_reference} has no result"),
            })?;
            Value::Integer(result.back_reference_value())
        }
    };
    Ok(BoundValue(value))
}
