//! Test utilities for rowgate integration tests.
//!
//! Provides:
//! - Temporary database fixtures with a notes schema and route table
//! - A notification sink that records every delivery

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rowgate::flow::NotificationSink;
use rowgate::provider::ContentValues;
use rowgate::query::QueryArguments;
use rowgate::route::{Operation, PatternRouteTable, RouteSpec};
use rowgate::storage::Database;
use rowgate::Provider;
use tempfile::TempDir;

pub const AUTHORITY: &str = "notes.provider";
pub const NOTES: &str = "content://notes.provider/notes";
pub const SUMMARIES: &str = "content://notes.provider/summaries";
pub const TAGS: &str = "content://notes.provider/tags";

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS notes (
        _id INTEGER PRIMARY KEY,
        title TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'active',
        version INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS tags (
        _id INTEGER PRIMARY KEY,
        note_id INTEGER NOT NULL REFERENCES notes(_id),
        name TEXT NOT NULL
    )",
    "CREATE VIEW IF NOT EXISTS summaries AS
        SELECT status, COUNT(*) AS total FROM notes GROUP BY status",
];

/// Route table for the notes schema.
pub fn routes() -> PatternRouteTable {
    PatternRouteTable::from_specs(
        AUTHORITY,
        &[
            RouteSpec::table("notes").with_notify("summaries"),
            RouteSpec::table("tags").with_notify("notes"),
            RouteSpec::table("summaries").with_operations(&[Operation::Query]),
        ],
    )
}

/// Sink that keeps every delivered change set.
#[derive(Debug, Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<BTreeSet<String>>>,
}

impl RecordingSink {
    pub fn deliveries(&self) -> Vec<BTreeSet<String>> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, targets: &BTreeSet<String>) {
        self.deliveries.lock().unwrap().push(targets.clone());
    }
}

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
    pub sink: Arc<RecordingSink>,
    pub provider: Provider<PatternRouteTable>,
}

impl TestFixture {
    /// Create a file-backed provider over the notes schema.
    pub fn new() -> Self {
        rowgate::observability::tracing::init_test_tracing();

        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path, 2).expect("failed to open database");
        db.initialize_schema(SCHEMA).expect("failed to create schema");

        let sink = Arc::new(RecordingSink::default());
        let provider = Provider::with_sink(db, routes(), sink.clone());
        Self {
            temp_dir,
            db_path,
            sink,
            provider,
        }
    }

    /// Titles of every note, in insertion order.
    pub fn titles(&self) -> Vec<String> {
        let args = QueryArguments::new().with_sort_sql("_id");
        let result = self
            .provider
            .query(NOTES, Some(&["title".to_string()]), &args)
            .expect("query failed");
        result
            .rows
            .iter()
            .map(|row| match &row[0] {
                rusqlite::types::Value::Text(t) => t.clone(),
                other => panic!("unexpected title {other:?}"),
            })
            .collect()
    }

    pub fn deliveries(&self) -> Vec<BTreeSet<String>> {
        self.sink.deliveries()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn note(title: &str) -> ContentValues {
    ContentValues::new().put("title", title)
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: std::time::Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
