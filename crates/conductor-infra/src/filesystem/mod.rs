//! Filesystem adapters for Conductor.
//!
//! Data directory resolution and the JSON-file `StateStore`.

pub mod json_store;

use std::path::{Path, PathBuf};

pub use json_store::JsonFileStateStore;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CONDUCTOR_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CONDUCTOR_DATA_DIR` environment variable
/// 2. `~/.conductor`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".conductor");
    }

    // Last resort: current directory
    PathBuf::from(".conductor")
}

/// Root of the JSON-file store inside the data directory.
pub fn workflows_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("workflows")
}
