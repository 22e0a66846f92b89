//! Connection pragmas and schema setup.

use rusqlite::Connection;

/// Milliseconds a writer waits on a locked database before failing.
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Pragmas for the writer connection.
///
/// WAL lets pooled readers proceed while a write transaction is open.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Pragmas for pooled read-only connections.
pub fn apply_reader_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
    conn.pragma_update(None, "query_only", "ON")?;
    Ok(())
}

/// Run application schema statements in one transaction.
///
/// Statements should be idempotent (`CREATE TABLE IF NOT EXISTS ...`); they
/// run every time a database is opened with a manifest.
pub fn initialize_schema<S: AsRef<str>>(conn: &mut Connection, statements: &[S]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for statement in statements {
        tx.execute_batch(statement.as_ref())?;
    }
    tx.commit()?;
    tracing::debug!(statements = statements.len(), "Schema initialized");
    Ok(())
}
