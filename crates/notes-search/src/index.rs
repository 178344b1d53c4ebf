//! Tantivy index management.
//!
//! Handles index creation, opening, the shared reader, and writer
//! acquisition.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tantivy::directory::error::LockError;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyError};
use tracing::{debug, info};

use crate::error::SearchError;
use crate::schema::{build_notes_schema, register_tokenizers, SearchSchema};

/// Default memory budget for IndexWriter (50MB)
pub const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// How long a write waits for another process to release the writer lock
pub const DEFAULT_WRITER_WAIT: Duration = Duration::from_secs(5);

const WRITER_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Search index configuration
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Path to index directory
    pub index_path: PathBuf,
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
    /// Wait for a busy writer lock before giving up
    pub writer_wait: Duration,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("data/indexes"),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
            writer_wait: DEFAULT_WRITER_WAIT,
        }
    }
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
            writer_wait: DEFAULT_WRITER_WAIT,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    pub fn with_writer_wait(mut self, wait: Duration) -> Self {
        self.writer_wait = wait;
        self
    }
}

/// Wrapper for Tantivy index with schema access.
///
/// Holds the single reader every searcher is taken from. The reader follows
/// commits made by any process; [`SearchIndexer`](crate::SearchIndexer) also
/// reloads it after its own commits so they are visible as soon as the call
/// returns. Searchers taken earlier keep their snapshot.
///
/// No writer is held between operations, so any number of handles, in this
/// process or others, can open the same directory.
#[derive(Clone)]
pub struct SearchIndex {
    index: Index,
    schema: SearchSchema,
    reader: IndexReader,
    config: SearchIndexConfig,
}

impl SearchIndex {
    /// Open existing index or create new one.
    pub fn open_or_create(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let index = open_or_create_index(&config.index_path)?;
        let schema = SearchSchema::from_schema(index.schema())?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        info!(path = ?config.index_path, "Opened search index");

        Ok(Self {
            index,
            schema,
            reader,
            config,
        })
    }

    /// Get the search schema
    pub fn schema(&self) -> &SearchSchema {
        &self.schema
    }

    /// Get the underlying Tantivy index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Create an IndexWriter with the configured memory budget.
    ///
    /// The writer holds the directory lock until dropped. While another
    /// writer holds it, retries for up to `writer_wait` and then fails with
    /// [`SearchError::IndexLocked`].
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let memory_budget = self.config.writer_memory_mb * 1024 * 1024;
        let start = Instant::now();

        loop {
            match self.index.writer(memory_budget) {
                Ok(writer) => {
                    debug!(
                        memory_mb = self.config.writer_memory_mb,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "Created index writer"
                    );
                    return Ok(writer);
                }
                Err(TantivyError::LockFailure(LockError::LockBusy, detail)) => {
                    if start.elapsed() >= self.config.writer_wait {
                        return Err(SearchError::IndexLocked(
                            detail.unwrap_or_else(|| "writer lock busy".to_string()),
                        ));
                    }
                    thread::sleep(WRITER_RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The shared reader.
    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    /// A point-in-time searcher over the last reloaded commit.
    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Make the latest commit visible to new searchers.
    pub fn reload(&self) -> Result<(), SearchError> {
        self.reader.reload()?;
        debug!("Reloaded index reader");
        Ok(())
    }

    /// Get the index path
    pub fn path(&self) -> &Path {
        &self.config.index_path
    }

    /// Check if index exists at the configured path
    pub fn exists(&self) -> bool {
        self.config.index_path.join("meta.json").exists()
    }
}

/// Open an existing index or create a new one, registering the custom
/// analyzers either way.
///
/// An existing index keeps its on-disk schema.
pub fn open_or_create_index(path: &Path) -> Result<Index, SearchError> {
    let index = if path.join("meta.json").exists() {
        debug!(path = ?path, "Opening existing index");
        Index::open_in_dir(path)?
    } else {
        info!(path = ?path, "Creating new index");
        std::fs::create_dir_all(path)?;
        let schema = build_notes_schema();
        Index::create_in_dir(path, schema.schema().clone())?
    };
    register_tokenizers(&index)?;
    Ok(index)
}
