//! JSON route manifests.
//!
//! A manifest names the authority, the schema statements to run on `init`
//! and the routed tables:
//!
//! ```json
//! {
//!   "authority": "notes.provider",
//!   "schema": ["CREATE TABLE IF NOT EXISTS notes (_id INTEGER PRIMARY KEY, title TEXT)"],
//!   "routes": [{ "table": "notes", "notify": ["summaries"] }]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::route::{PatternRouteTable, RouteSpec};

/// Error type for manifest loading.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Manifest has no authority")]
    MissingAuthority,
}

/// Routing and schema for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub authority: String,
    #[serde(default)]
    pub schema: Vec<String>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self = serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.validate()?;

        tracing::debug!(
            path = %path.display(),
            authority = %manifest.authority,
            routes = manifest.routes.len(),
            "Manifest loaded"
        );
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.authority.trim().is_empty() {
            return Err(ManifestError::MissingAuthority);
        }
        Ok(())
    }

    /// Build the route table described by this manifest.
    pub fn route_table(&self) -> PatternRouteTable {
        PatternRouteTable::from_specs(&self.authority, &self.routes)
    }
}
