//! Error types for vault access and bulk reindexing.

use notes_search::SearchError;
use notes_types::StoreError;
use thiserror::Error;

/// Errors that can occur while indexing notes
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Document store operation failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Search index error
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Lock file could not be created, read or removed
    #[error("Lock error: {0}")]
    Lock(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexingError::Lock("permission denied".to_string());
        assert_eq!(err.to_string(), "Lock error: permission denied");

        let err = IndexingError::Store(StoreError::NotFound("user_1/a.md".to_string()));
        assert!(err.to_string().starts_with("Store error:"));
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let indexing_err: IndexingError = json_err.into();
        assert!(matches!(indexing_err, IndexingError::Serialization(_)));
    }
}
