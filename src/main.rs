//! Rowgate: command-line access to URI-routed SQLite tables.
//!
//! # Usage
//!
//! ```bash
//! rowgate --manifest manifest.json --database notes.db init
//! rowgate query 'content://notes.provider/notes?limit=5' --args '{"sort_columns": ["title"]}'
//! rowgate apply batch.json
//! ```
//!
//! Environment variables can also be used:
//! - `ROWGATE_DATABASE`: SQLite database file
//! - `ROWGATE_MANIFEST`: Route manifest
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use serde_json::{json, Value as Json};

use rowgate::config::{Command, Config};
use rowgate::flow::NotificationBus;
use rowgate::manifest::Manifest;
use rowgate::observability::tracing::init_tracing;
use rowgate::provider::BatchGroup;
use rowgate::query::{QueryArguments, QueryResult};
use rowgate::storage::Database;
use rowgate::Provider;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse_args();
    init_tracing(&config.log_level, config.log_json);

    let bus = Arc::new(NotificationBus::new(config.notify_channel_size));
    let mut notifications = bus.subscribe();

    // Provider calls block on SQLite.
    let output = tokio::task::spawn_blocking(move || run(&config, bus))
        .await
        .context("command task panicked")??;

    if let Some(output) = output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    while let Ok(notification) = notifications.try_recv() {
        let targets: Vec<&String> = notification.targets.iter().collect();
        println!("{}", json!({ "changed": targets }));
    }

    Ok(())
}

fn run(config: &Config, bus: Arc<NotificationBus>) -> Result<Option<Json>> {
    let manifest = Manifest::load(&config.manifest)?;
    let db = Database::open(&config.database, config.reader_pool_size)
        .with_context(|| format!("failed to open {}", config.database.display()))?;

    if config.command == Command::Init {
        db.initialize_schema(&manifest.schema)
            .context("failed to run schema statements")?;
        tracing::info!(
            database = %config.database.display(),
            statements = manifest.schema.len(),
            "Database initialized"
        );
        return Ok(None);
    }

    let provider = Provider::with_sink(db, manifest.route_table(), bus);

    match &config.command {
        Command::Init => Ok(None),
        Command::Query {
            identifier,
            args,
            projection,
        } => {
            let args: QueryArguments = match args {
                Some(raw) => serde_json::from_str(raw).context("invalid --args JSON")?,
                None => QueryArguments::new(),
            };
            let projection = (!projection.is_empty()).then_some(projection.as_slice());
            let result = provider.query(identifier, projection, &args)?;
            Ok(Some(query_to_json(&result)))
        }
        Command::Apply { file } => {
            let raw = fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let groups: Vec<BatchGroup> =
                serde_json::from_str(&raw).with_context(|| format!("invalid batch {}", file.display()))?;
            let outcome = provider.apply_alternatives(&groups)?;
            tracing::info!(group = outcome.index, "Batch applied");
            Ok(Some(serde_json::to_value(&outcome)?))
        }
        Command::Type { identifier } => {
            let content_type = provider
                .content_type(identifier)
                .with_context(|| format!("identifier {identifier} is unrecognized"))?;
            Ok(Some(Json::String(content_type)))
        }
    }
}

fn query_to_json(result: &QueryResult) -> Json {
    let rows: Vec<Json> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.clone(), value_to_json(value)))
                .collect::<serde_json::Map<_, _>>()
                .into()
        })
        .collect();

    json!({
        "rows": rows,
        "honored_arguments": result.honored_arguments,
        "notification_identifier": result.notification_identifier.to_string(),
    })
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(n) => json!(n),
        Value::Real(r) => json!(r),
        Value::Text(t) => json!(t),
        Value::Blob(b) => json!(b),
    }
}
