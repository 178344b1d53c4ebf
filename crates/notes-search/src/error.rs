//! Search error types.

use thiserror::Error;

/// Errors that can occur during indexing and search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Query parse error
    #[error("Query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Another writer kept the index directory lock past the wait
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// A record that cannot be indexed
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A request rejected before execution
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Query execution failed; carries the underlying detail
    #[error("Search failed: {0}")]
    SearchFailed(String),
}

impl From<notes_types::NotesError> for SearchError {
    fn from(err: notes_types::NotesError) -> Self {
        SearchError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SearchError::SearchFailed("reader closed".to_string());
        assert_eq!(err.to_string(), "Search failed: reader closed");

        let err = SearchError::InvalidDocument("empty path".to_string());
        assert_eq!(err.to_string(), "Invalid document: empty path");
    }

    #[test]
    fn test_from_notes_error() {
        let err: SearchError = notes_types::NotesError::InvalidInput("limit".into()).into();
        assert!(matches!(err, SearchError::InvalidRequest(msg) if msg.contains("limit")));
    }
}
