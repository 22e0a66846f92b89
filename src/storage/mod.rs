//! SQLite storage layer.
//!
//! Provides:
//! - Connection pragmas and schema initialization
//! - Shared writer connection with single-writer discipline
//! - Read connection pool for queries outside transactions

pub mod database;
pub mod reader;
pub mod schema;

pub use database::{Database, WriterGuard};
