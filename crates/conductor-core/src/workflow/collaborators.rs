//! Narrow traits for the external services built-in nodes depend on.
//!
//! The engine never talks to a chat provider or the filesystem directly;
//! `ai_chat` and `scan_project` go through these traits so the binary can
//! wire real implementations and tests can wire fakes.

use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

// ---------------------------------------------------------------------------
// Chat completion
// ---------------------------------------------------------------------------

/// A chat request as seen by the `ai_chat` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

/// Produces a text response for a prompt.
pub trait ChatCompletion: Send + Sync {
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<String, CollaboratorError>> + Send;
}

/// Chat collaborator used when no provider is configured. Always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredChat;

impl ChatCompletion for UnconfiguredChat {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, CollaboratorError> {
        Err(CollaboratorError(
            "no chat completion provider is configured".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Project scanning
// ---------------------------------------------------------------------------

/// What to scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub root: PathBuf,
    /// Lowercase extensions without the dot; empty means all files.
    pub extensions: Vec<String>,
    pub max_files: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Path relative to the scan root, `/`-separated.
    pub path: String,
    pub size_bytes: u64,
}

/// Scanner output, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectScan {
    pub files: Vec<ScannedFile>,
}

impl ProjectScan {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Lists the files of a project directory.
pub trait ProjectScanner: Send + Sync {
    fn scan(
        &self,
        request: &ScanRequest,
    ) -> impl Future<Output = Result<ProjectScan, CollaboratorError>> + Send;
}
