//! Error types shared across the notes search crates.

use thiserror::Error;

/// Unified error type for settings and request validation.
#[derive(Debug, Error)]
pub enum NotesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure while touching `path`
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Path escapes the vault root or is otherwise unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A tenant directory whose name does not carry a tenant id
    #[error("Invalid tenant directory: {0}")]
    InvalidTenant(String),

    /// Document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StoreError::NotFound(path.into());
        }
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
