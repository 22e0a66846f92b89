//! Configuration parsing for the rowgate CLI.
//!
//! Supports:
//! - CLI arguments and subcommands via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::storage::database::DEFAULT_READER_POOL_SIZE;

/// Rowgate: URI-routed SQLite tables with transactional batches.
#[derive(Parser, Debug, Clone)]
#[command(name = "rowgate")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// SQLite database file
    #[arg(short, long, env = "ROWGATE_DATABASE", default_value = "./rowgate.db")]
    pub database: PathBuf,

    /// Route manifest (JSON)
    #[arg(short, long, env = "ROWGATE_MANIFEST", default_value = "./manifest.json")]
    pub manifest: PathBuf,

    /// Log level or filter directives (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "ROWGATE_LOG_JSON")]
    pub log_json: bool,

    /// Size of the reader connection pool (0 reads through the writer)
    #[arg(long, env = "ROWGATE_READER_POOL_SIZE", default_value_t = DEFAULT_READER_POOL_SIZE)]
    pub reader_pool_size: u32,

    /// Size of the notification channel
    #[arg(long, env = "ROWGATE_NOTIFY_CHANNEL_SIZE", default_value_t = 1024)]
    pub notify_channel_size: usize,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the database and run the manifest's schema statements
    Init,

    /// Query an identifier and print the rows as JSON
    Query {
        /// Identifier, e.g. content://notes.provider/notes?limit=10
        identifier: String,

        /// Query arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Columns to return, comma separated (`_count` for a row count)
        #[arg(long, value_delimiter = ',')]
        projection: Vec<String>,
    },

    /// Apply a JSON file of alternative batch groups
    Apply {
        /// File holding an array of groups, each an array of operations
        file: PathBuf,
    },

    /// Print the content type of an identifier
    Type {
        identifier: String,
    },
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a configuration for testing.
    #[cfg(test)]
    pub fn test_config(dir: &std::path::Path, command: Command) -> Self {
        Self {
            database: dir.join("test.db"),
            manifest: dir.join("manifest.json"),
            log_level: "debug".into(),
            log_json: false,
            reader_pool_size: 2,
            notify_channel_size: 16,
            command,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("./rowgate.db"),
            manifest: PathBuf::from("./manifest.json"),
            log_level: "info".into(),
            log_json: false,
            reader_pool_size: DEFAULT_READER_POOL_SIZE,
            notify_channel_size: 1024,
            command: Command::Init,
        }
    }
}
