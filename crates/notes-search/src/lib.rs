//! # notes-search
//!
//! Full-text indexing and search for markdown notes using Tantivy.
//!
//! Notes are indexed with their tags and frontmatter properties. Queries are
//! built from structured terms (words, phrases, regular expressions, tags and
//! single-line constraints) and ranked with BM25.
//!
//! ## Features
//! - Embedded Tantivy index with a shared, manually reloaded reader
//! - Metadata extraction from markdown (frontmatter, tags, headings, links)
//! - Upsert-by-path indexing with one commit per operation
//! - Trigram prefilter that narrows regex candidates before verification

pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod markdown;
pub mod planner;
pub mod schema;
pub mod searcher;
pub mod stats;

pub use document::{doc_to_indexed, normalize_tag, record_from_markdown, record_to_doc, IndexedDocument};
pub use error::SearchError;
pub use index::{
    open_or_create_index, SearchIndex, SearchIndexConfig, DEFAULT_WRITER_MEMORY_MB,
    DEFAULT_WRITER_WAIT,
};
pub use indexer::SearchIndexer;
pub use markdown::{extract, extract_tags};
pub use planner::{extract_regex_prefix, prefilter_trigram, LineMatcher, QueryPlan, QueryPlanner, Verifier};
pub use schema::{build_notes_schema, register_tokenizers, SearchSchema};
pub use searcher::NoteSearcher;
pub use stats::{directory_size_bytes, DetailedIndexStats, IndexStats};
