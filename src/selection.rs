//! Effective WHERE clause construction.

use crate::error::StoreError;
use crate::route::{Identifier, RouteMatch};

/// Primary key column every routed table carries.
pub const ID_COLUMN: &str = "_id";

/// Predicate used when a bulk operation has no client selection.
pub const ALWAYS_TRUE: &str = "1";

const WHERE_ID: &str = "_id = ?";

/// A predicate and its bound arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub clause: String,
    pub args: Vec<String>,
}

/// Build the effective selection for `route`.
///
/// Record identifiers get `_id = ?` placed first, ANDed with the client
/// selection, and their id prepended to the arguments. Without a client
/// selection a collection route selects every row.
pub fn build(
    route: &RouteMatch,
    identifier: &Identifier,
    client_selection: Option<&str>,
    client_args: &[String],
) -> Result<Selection, StoreError> {
    let client_selection = client_selection.filter(|s| !s.trim().is_empty());

    if route.is_record_identifier() {
        let id = identifier.record_id().ok_or_else(|| {
            StoreError::InvalidArgument(format!("{identifier} does not end in a record id"))
        })?;

        let clause = match client_selection {
            Some(selection) => format!("{WHERE_ID} AND ({selection})"),
            None => WHERE_ID.to_string(),
        };

        let mut args = Vec::with_capacity(client_args.len() + 1);
        args.push(id.to_string());
        args.extend_from_slice(client_args);

        return Ok(Selection { clause, args });
    }

    Ok(match client_selection {
        Some(selection) => Selection {
            clause: selection.to_string(),
            args: client_args.to_vec(),
        },
        None => Selection {
            clause: ALWAYS_TRUE.to_string(),
            args: client_args.to_vec(),
        },
    })
}

/// `column` or `table.column`, made of ASCII alphanumerics and underscores.
pub fn is_column_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
