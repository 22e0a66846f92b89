//! Generic query argument map and its translation into query inputs.
//!
//! Every recognized key is validated on its own. A bad value is logged and
//! dropped; it never fails the query and never appears in the honored set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::selection::is_column_name;

pub const SQL_SELECTION: &str = "sql_selection";
pub const SQL_SELECTION_ARGS: &str = "sql_selection_args";
pub const SQL_SORT_ORDER: &str = "sql_sort_order";
pub const SORT_COLUMNS: &str = "sort_columns";
pub const SORT_DIRECTION: &str = "sort_direction";
pub const LIMIT: &str = "limit";
pub const OFFSET: &str = "offset";

/// Upper bound for `limit` and `offset`.
pub const MAX_BOUND: i64 = i32::MAX as i64;

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    TextList(Vec<String>),
    /// Any other JSON shape. Kept so one ill-typed key cannot fail the map.
    Other(serde_json::Value),
}

/// Sort direction for structured sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn from_value(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Text(text) if text.eq_ignore_ascii_case("asc") => Some(Self::Asc),
            ArgValue::Text(text) if text.eq_ignore_ascii_case("desc") => Some(Self::Desc),
            ArgValue::Int(0) => Some(Self::Asc),
            ArgValue::Int(1) => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Key/value query arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryArguments(BTreeMap<String, ArgValue>);

impl QueryArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set an arbitrary key. No validation happens here.
    pub fn insert(&mut self, key: impl Into<String>, value: ArgValue) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<ArgValue> {
        self.0.remove(key)
    }

    pub fn with_selection(mut self, selection: &str, args: &[&str]) -> Self {
        self.insert(SQL_SELECTION, ArgValue::Text(selection.to_string()));
        self.insert(
            SQL_SELECTION_ARGS,
            ArgValue::TextList(args.iter().map(|a| (*a).to_string()).collect()),
        );
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.insert(LIMIT, ArgValue::Int(limit));
        self
    }

    pub fn with_offset_and_limit(mut self, offset: i64, limit: i64) -> Self {
        self.insert(OFFSET, ArgValue::Int(offset));
        self.insert(LIMIT, ArgValue::Int(limit));
        self
    }

    /// Structured sort. Clears any raw SQL sort order.
    pub fn with_sort_columns(mut self, columns: &[&str], direction: SortDirection) -> Self {
        self.remove(SQL_SORT_ORDER);
        self.insert(
            SORT_COLUMNS,
            ArgValue::TextList(columns.iter().map(|c| (*c).to_string()).collect()),
        );
        self.insert(SORT_DIRECTION, ArgValue::Text(direction.as_sql().to_string()));
        self
    }

    /// Raw SQL sort. Clears any structured sort.
    pub fn with_sort_sql(mut self, sort: &str) -> Self {
        self.remove(SORT_COLUMNS);
        self.remove(SORT_DIRECTION);
        self.insert(SQL_SORT_ORDER, ArgValue::Text(sort.to_string()));
        self
    }
}

/// Query inputs produced from [`QueryArguments`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub selection: Option<String>,
    pub selection_args: Vec<String>,
    pub sort_order: Option<String>,
    /// `LIMIT` expression, `"<offset>,<limit>"` when an offset is honored.
    pub limit: Option<String>,
    /// Recognized keys that were applied.
    pub honored: BTreeSet<&'static str>,
}

/// Translate `args` into query inputs.
///
/// `legacy_limit` is the identifier's `limit` query parameter; a `limit`
/// argument, valid or not, takes precedence over it.
pub fn resolve(args: &QueryArguments, legacy_limit: Option<&str>) -> ResolvedQuery {
    let mut resolved = ResolvedQuery::default();

    if let Some(value) = args.get(SQL_SELECTION) {
        match value {
            ArgValue::Text(text) if !text.is_empty() => {
                resolved.selection = Some(text.clone());
                resolved.honored.insert(SQL_SELECTION);
            }
            other => tracing::warn!(key = SQL_SELECTION, value = ?other, "Ignoring invalid query argument; expected non-empty string"),
        }
    }

    if let Some(value) = args.get(SQL_SELECTION_ARGS) {
        match value {
            ArgValue::TextList(list) => {
                resolved.selection_args = list.clone();
                resolved.honored.insert(SQL_SELECTION_ARGS);
            }
            other => tracing::warn!(key = SQL_SELECTION_ARGS, value = ?other, "Ignoring invalid query argument; expected string list"),
        }
    }

    resolve_sort(args, &mut resolved);

    let mut limit = legacy_limit.and_then(parse_legacy_limit);
    if let Some(value) = args.get(LIMIT) {
        match bounded_int(value, 1) {
            Some(bundle_limit) => {
                if limit.is_some() {
                    tracing::warn!("Query has both a limit argument and a limit query parameter; using the argument");
                }
                limit = Some(bundle_limit);
                resolved.honored.insert(LIMIT);
            }
            None => {
                tracing::warn!(key = LIMIT, value = ?value, max = MAX_BOUND, "Ignoring invalid query argument; expected integer in [1, max]");
                limit = None;
            }
        }
    }

    let mut offset = None;
    if let Some(value) = args.get(OFFSET) {
        match bounded_int(value, 0) {
            Some(_) if limit.is_none() => {
                tracing::warn!("{} must be set when using {}; ignoring offset", LIMIT, OFFSET);
            }
            Some(valid) => {
                offset = Some(valid);
                resolved.honored.insert(OFFSET);
            }
            None => {
                tracing::warn!(key = OFFSET, value = ?value, max = MAX_BOUND, "Ignoring invalid query argument; expected integer in [0, max]");
            }
        }
    }

    // SQLite's comma form puts the offset first.
    resolved.limit = match (offset, limit) {
        (Some(offset), Some(limit)) => Some(format!("{offset},{limit}")),
        (None, Some(limit)) => Some(limit.to_string()),
        _ => None,
    };

    resolved
}

fn resolve_sort(args: &QueryArguments, resolved: &mut ResolvedQuery) {
    if let Some(value) = args.get(SQL_SORT_ORDER) {
        match value {
            ArgValue::Text(text) if !text.trim().is_empty() => {
                resolved.sort_order = Some(text.clone());
                resolved.honored.insert(SQL_SORT_ORDER);
            }
            other => tracing::warn!(key = SQL_SORT_ORDER, value = ?other, "Ignoring invalid query argument; expected non-empty string"),
        }
    }

    if !args.contains_key(SORT_COLUMNS) {
        if args.contains_key(SORT_DIRECTION) {
            tracing::warn!("{} has no effect without {}", SORT_DIRECTION, SORT_COLUMNS);
        }
        return;
    }

    if resolved.sort_order.is_some() {
        tracing::warn!("Both {} and {} present; using {}", SQL_SORT_ORDER, SORT_COLUMNS, SQL_SORT_ORDER);
        return;
    }

    let columns = match args.get(SORT_COLUMNS) {
        Some(ArgValue::TextList(columns))
            if !columns.is_empty() && columns.iter().all(|c| is_column_name(c)) =>
        {
            columns
        }
        other => {
            tracing::warn!(key = SORT_COLUMNS, value = ?other, "Ignoring invalid query argument; expected non-empty list of column names");
            return;
        }
    };

    let direction = match args.get(SORT_DIRECTION) {
        Some(value) => match SortDirection::from_value(value) {
            Some(direction) => {
                resolved.honored.insert(SORT_DIRECTION);
                direction
            }
            None => {
                tracing::warn!(key = SORT_DIRECTION, value = ?value, "Ignoring invalid query argument; expected ASC or DESC");
                SortDirection::Asc
            }
        },
        None => SortDirection::Asc,
    };

    resolved.sort_order = Some(format!("{} {}", columns.join(", "), direction.as_sql()));
    resolved.honored.insert(SORT_COLUMNS);
}

fn bounded_int(value: &ArgValue, min: i64) -> Option<i64> {
    match value {
        ArgValue::Int(n) if (min..=MAX_BOUND).contains(n) => Some(*n),
        _ => None,
    }
}

fn parse_legacy_limit(raw: &str) -> Option<i64> {
    match raw.parse::<i64>() {
        Ok(n) if (1..=MAX_BOUND).contains(&n) => Some(n),
        Ok(n) => {
            tracing::warn!(limit = n, "Ignoring limit query parameter outside [1, max]");
            None
        }
        Err(_) => {
            tracing::warn!(limit = raw, "Ignoring limit query parameter that is not an integer");
            None
        }
    }
}
