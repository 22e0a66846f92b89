//! Pattern-based route table.
//!
//! Patterns are `/`-separated path segments under one authority. `#` matches
//! one numeric segment and `*` matches any one segment. The first registered
//! pattern that matches wins.

use serde::{Deserialize, Serialize};

use super::{Identifier, Operation, RouteMatch, RouteTable};
use crate::error::StoreError;

/// Declarative description of one table's routes.
///
/// Registers `<path>` as the collection route and `<path>/#` as the record
/// route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Table or view name.
    pub table: String,

    /// Path under the authority; defaults to the table name.
    #[serde(default)]
    pub path: Option<String>,

    /// Content type reported for the collection route.
    #[serde(default)]
    pub collection_type: Option<String>,

    /// Content type reported for the record route.
    #[serde(default)]
    pub item_type: Option<String>,

    /// Permitted verbs; all of them when omitted.
    #[serde(default = "all_operations")]
    pub operations: Vec<Operation>,

    /// Additional notify targets, either full identifiers or paths under the
    /// same authority.
    #[serde(default)]
    pub notify: Vec<String>,
}

fn all_operations() -> Vec<Operation> {
    Operation::ALL.to_vec()
}

impl RouteSpec {
    /// A read-write route for `table` with default content types.
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            path: None,
            collection_type: None,
            item_type: None,
            operations: all_operations(),
            notify: Vec::new(),
        }
    }

    /// Restrict the permitted verbs.
    pub fn with_operations(mut self, operations: &[Operation]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    /// Add a notify target.
    pub fn with_notify(mut self, target: &str) -> Self {
        self.notify.push(target.to_string());
        self
    }

    /// Collection content type, `vnd.rowgate.dir/<table>` unless set.
    pub fn collection_type(&self) -> String {
        self.collection_type
            .clone()
            .unwrap_or_else(|| format!("vnd.rowgate.dir/{}", self.table))
    }

    /// Record content type, `vnd.rowgate.item/<table>` unless set.
    pub fn item_type(&self) -> String {
        self.item_type
            .clone()
            .unwrap_or_else(|| format!("vnd.rowgate.item/{}", self.table))
    }

    fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Number,
    Any,
}

impl Segment {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == candidate,
            Segment::Number => {
                !candidate.is_empty() && candidate.bytes().all(|b| b.is_ascii_digit())
            }
            Segment::Any => true,
        }
    }
}

/// Immutable route table keyed by path patterns.
#[derive(Debug, Clone)]
pub struct PatternRouteTable {
    authority: String,
    routes: Vec<(Vec<Segment>, RouteMatch)>,
}

impl PatternRouteTable {
    /// Create an empty table for `authority`.
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            routes: Vec::new(),
        }
    }

    /// Build a table from route specs.
    pub fn from_specs(authority: &str, specs: &[RouteSpec]) -> Self {
        specs
            .iter()
            .fold(Self::new(authority), |table, spec| table.with_spec(spec))
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Register a pattern; the stored match is returned for every hit.
    pub fn with_pattern(mut self, pattern: &str, route: RouteMatch) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "#" => Segment::Number,
                "*" => Segment::Any,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();
        self.routes.push((segments, route));
        self
    }

    /// Register the collection and record routes for one table.
    pub fn with_spec(self, spec: &RouteSpec) -> Self {
        let path = spec.path().trim_matches('/').to_string();
        let base = Identifier::from_parts(&self.authority, path.split('/'));

        let mut notify = vec![base.to_string()];
        notify.extend(spec.notify.iter().map(|target| {
            if target.contains("://") {
                target.clone()
            } else {
                Identifier::from_parts(&self.authority, target.trim_matches('/').split('/'))
                    .to_string()
            }
        }));

        let collection = RouteMatch::new(
            base.clone(),
            notify.clone(),
            spec.operations.iter().copied(),
            spec.table.clone(),
            spec.collection_type(),
            false,
        );
        let record = RouteMatch::new(
            base,
            notify,
            spec.operations.iter().copied(),
            spec.table.clone(),
            spec.item_type(),
            true,
        );

        let record_pattern = format!("{path}/#");
        self.with_pattern(&path, collection)
            .with_pattern(&record_pattern, record)
    }
}

impl RouteTable for PatternRouteTable {
    fn match_identifier(&self, identifier: &Identifier) -> Result<RouteMatch, StoreError> {
        if identifier.authority() == self.authority {
            let segments = identifier.segments();
            for (pattern, route) in &self.routes {
                if pattern.len() == segments.len()
                    && pattern.iter().zip(segments).all(|(p, s)| p.matches(s))
                {
                    return Ok(route.clone());
                }
            }
        }

        Err(StoreError::UnrecognizedIdentifier(identifier.to_string()))
    }
}
