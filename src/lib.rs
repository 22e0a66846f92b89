//! Rowgate: URI-routed SQLite tables with nested transactional batches.
//!
//! Clients address tables through opaque identifiers such as
//! `content://notes.provider/notes/42`. A route table maps each identifier
//! to a physical table and the verbs it permits. Writes run in one
//! transaction per call, batches nest through savepoints, and every
//! committed transaction delivers one coalesced change notification.
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Error taxonomy
//! - [`flow`]: Notification queue and sinks
//! - [`manifest`]: JSON route manifests
//! - [`observability`]: Tracing setup
//! - [`provider`]: Queries, writes, batches and alternatives
//! - [`query`]: Query arguments and SELECT execution
//! - [`route`]: Identifiers and route tables
//! - [`selection`]: Effective WHERE clauses
//! - [`storage`]: SQLite persistence layer

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // route::RouteTable is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::similar_names,              // sel/selection are fine
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod config;
pub mod error;
pub mod flow;
pub mod manifest;
pub mod observability;
pub mod provider;
pub mod query;
pub mod route;
pub mod selection;
pub mod storage;

pub use error::{Result, StoreError};
pub use provider::Provider;
