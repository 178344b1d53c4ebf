//! Search facade used by request handlers, the CLI and the scheduler.
//!
//! Indexing is secondary to the file write that triggered it, so write
//! operations never fail: errors are logged and reported as `false`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use notes_search::{
    record_from_markdown, DetailedIndexStats, IndexStats, IndexedDocument, NoteSearcher,
    SearchError, SearchIndex, SearchIndexConfig, SearchIndexer,
};
use notes_types::{
    DocumentRecord, DocumentStore, SearchRequest, SearchResponse, Settings, MAX_LIMIT,
};

use crate::error::IndexingError;
use crate::reindex::{LoggingProgressCallback, ReindexConfig, ReindexOrchestrator, ReindexSummary};
use crate::vault::VaultStore;

/// One index plus the store it mirrors.
pub struct NoteSearch {
    index: SearchIndex,
    indexer: SearchIndexer,
    searcher: NoteSearcher,
    store: Arc<dyn DocumentStore>,
    reindex: ReindexConfig,
    max_limit: usize,
}

impl NoteSearch {
    pub fn new(
        index: SearchIndex,
        store: Arc<dyn DocumentStore>,
        reindex: ReindexConfig,
    ) -> Result<Self, IndexingError> {
        let indexer = SearchIndexer::new(&index)?;
        let searcher = NoteSearcher::new(&index)?;

        Ok(Self {
            index,
            indexer,
            searcher,
            store,
            reindex,
            max_limit: MAX_LIMIT,
        })
    }

    /// Open the configured index over a [`VaultStore`] at `vaults_root`.
    pub fn from_settings(settings: &Settings) -> Result<Self, IndexingError> {
        let index_dir = settings.expanded_index_dir();
        let index = SearchIndex::open_or_create(
            SearchIndexConfig::new(&index_dir)
                .with_memory_mb(settings.writer_memory_mb)
                .with_writer_wait(Duration::from_millis(settings.writer_wait_ms)),
        )?;
        let store = Arc::new(VaultStore::new(settings.expanded_vaults_root()));
        let reindex = ReindexConfig::for_index_dir(&index_dir)
            .with_batch_size(settings.reindex.batch_size)
            .with_stale_after(Duration::from_secs(settings.reindex.lock_stale_secs));

        Ok(Self::new(index, store, reindex)?.with_max_limit(settings.search.max_limit))
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn index_handle(&self) -> &SearchIndex {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Upsert one document.
    pub fn index(&self, record: &DocumentRecord) -> bool {
        match self.indexer.upsert(record) {
            Ok(_) => true,
            Err(e) => {
                error!(path = %record.path, error = %e, "Failed to index document");
                false
            }
        }
    }

    /// Extract metadata from markdown and upsert.
    pub fn index_markdown(&self, path: &str, content: &str) -> bool {
        self.index(&record_from_markdown(path, content, Utc::now()))
    }

    /// Read a note from the store and upsert it with its file time.
    pub fn index_stored(&self, path: &str) -> bool {
        match self.store.read(path) {
            Ok(file) => self.index(&record_from_markdown(&file.path, &file.content, file.modified)),
            Err(e) => {
                error!(path, error = %e, "Failed to read note for indexing");
                false
            }
        }
    }

    pub fn remove(&self, path: &str) -> bool {
        match self.indexer.delete(path) {
            Ok(_) => true,
            Err(e) => {
                error!(path, error = %e, "Failed to remove document");
                false
            }
        }
    }

    /// Drop `old_path` and index `content` under `new_path`.
    pub fn rename(&self, old_path: &str, new_path: &str, content: &str) -> bool {
        let removed = self.remove(old_path);
        let indexed = self.index_markdown(new_path, content);
        removed && indexed
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        request.validate(self.max_limit)?;
        self.searcher
            .search(request, self.store.as_ref())
            .inspect_err(|e| error!(error = %e, "Search failed"))
    }

    /// Stored fields of one document.
    pub fn document(&self, path: &str) -> Result<Option<IndexedDocument>, SearchError> {
        self.searcher.document(path)
    }

    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs() == 0
    }

    pub fn stats(&self) -> Result<IndexStats, SearchError> {
        self.index.stats()
    }

    pub fn detailed_stats(&self) -> DetailedIndexStats {
        self.index.detailed_stats()
    }

    pub fn optimize(&self) -> bool {
        match self.indexer.optimize() {
            Ok(merged) => {
                info!(merged, "Optimize complete");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to optimize index");
                false
            }
        }
    }

    /// Remove every document. Irreversible.
    pub fn clear(&self) -> bool {
        match self.indexer.clear() {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Failed to clear index");
                false
            }
        }
    }

    /// Reindex every vault, skipping notes whose indexed copy is current.
    pub fn reindex_all(&self, cancel: &CancellationToken) -> Result<ReindexSummary, IndexingError> {
        let callback = LoggingProgressCallback::new(self.reindex.batch_size);
        ReindexOrchestrator::new(
            &self.index,
            &self.indexer,
            &self.searcher,
            self.store.as_ref(),
            self.reindex.clone(),
        )
        .run(cancel, &callback)
        .inspect_err(|e| error!(error = %e, "Reindex failed"))
    }
}
