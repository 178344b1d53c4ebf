//! # notes-types
//!
//! Shared domain types for the notes search service.
//!
//! - Document records and extracted markdown metadata
//! - Search terms, requests and responses
//! - The [`DocumentStore`] trait the indexer reads content through
//! - Layered [`Settings`]

pub mod config;
pub mod document;
pub mod error;
pub mod query;
pub mod store;

pub use config::{ReindexSettings, SearchSettings, Settings};
pub use document::{display_name, index_precision, DocumentRecord, Heading, NoteMetadata, Task};
pub use error::{NotesError, StoreError};
pub use query::{
    SearchHit, SearchRequest, SearchResponse, SearchTerm, DEFAULT_LIMIT, MAX_LIMIT, MAX_OFFSET,
    MIN_LIMIT,
};
pub use store::{DocumentStore, FileEntry, StoredFile, TenantId, TENANT_PREFIX};
