//! Identifier routing.
//!
//! Provides:
//! - [`Identifier`] parsing
//! - [`RouteMatch`], the immutable result of routing an identifier
//! - [`RouteTable`], the application-supplied matcher
//! - [`PatternRouteTable`], a table-per-route matcher built from a manifest

pub mod identifier;
pub mod pattern;

pub use identifier::Identifier;
pub use pattern::{PatternRouteTable, RouteSpec};

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Verbs a route may permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Query,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Query,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Query => "QUERY",
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Details about a successful identifier match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    base_identifier: Identifier,
    notify_targets: BTreeSet<String>,
    allowed_operations: BTreeSet<Operation>,
    table_name: String,
    content_type: String,
    is_record_identifier: bool,
}

impl RouteMatch {
    /// Create a match.
    ///
    /// `base_identifier` must not carry a trailing record id. Duplicate
    /// notify targets collapse.
    pub fn new<N, O>(
        base_identifier: Identifier,
        notify_targets: N,
        allowed_operations: O,
        table_name: impl Into<String>,
        content_type: impl Into<String>,
        is_record_identifier: bool,
    ) -> Self
    where
        N: IntoIterator<Item = String>,
        O: IntoIterator<Item = Operation>,
    {
        Self {
            base_identifier: base_identifier.without_query(),
            notify_targets: notify_targets.into_iter().collect(),
            allowed_operations: allowed_operations.into_iter().collect(),
            table_name: table_name.into(),
            content_type: content_type.into(),
            is_record_identifier,
        }
    }

    pub fn base_identifier(&self) -> &Identifier {
        &self.base_identifier
    }

    /// Identifiers to notify when this resource's data changes.
    pub fn notify_targets(&self) -> &BTreeSet<String> {
        &self.notify_targets
    }

    pub fn is_operation_allowed(&self, operation: Operation) -> bool {
        self.allowed_operations.contains(&operation)
    }

    pub fn allowed_operations(&self) -> &BTreeSet<Operation> {
        &self.allowed_operations
    }

    /// Name of the table. May be a view.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// True when the identifier named one specific row.
    pub fn is_record_identifier(&self) -> bool {
        self.is_record_identifier
    }

    /// Fail with [`StoreError::OperationNotAllowed`] unless `operation` is permitted.
    pub fn require(&self, identifier: &Identifier, operation: Operation) -> Result<(), StoreError> {
        if self.is_operation_allowed(operation) {
            Ok(())
        } else {
            Err(StoreError::OperationNotAllowed {
                identifier: identifier.to_string(),
                operation,
            })
        }
    }
}

/// Application-specific identifier matching.
///
/// Implementations must be deterministic and free of side effects; the
/// storage core shares one instance across every calling thread.
pub trait RouteTable: Send + Sync {
    /// Match `identifier`, failing with [`StoreError::UnrecognizedIdentifier`]
    /// when no route applies.
    fn match_identifier(&self, identifier: &Identifier) -> Result<RouteMatch, StoreError>;
}

impl<T: RouteTable + ?Sized> RouteTable for std::sync::Arc<T> {
    fn match_identifier(&self, identifier: &Identifier) -> Result<RouteMatch, StoreError> {
        (**self).match_identifier(identifier)
    }
}

impl<T: RouteTable + ?Sized> RouteTable for Box<T> {
    fn match_identifier(&self, identifier: &Identifier) -> Result<RouteMatch, StoreError> {
        (**self).match_identifier(identifier)
    }
}
