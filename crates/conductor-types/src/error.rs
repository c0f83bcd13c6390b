use thiserror::Error;

/// Errors from state store operations (used by the `StateStore` trait in conductor-core).
///
/// Stores never retry on their own; callers decide what a failed save means.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("database connection error: {0}")]
    Connection(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Errors raised by node handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// No handler is registered under the requested node type.
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An external collaborator (chat provider, scanner) failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("node execution failed: {0}")]
    Execution(String),
}

impl NodeError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Execution(_))
    }
}
