//! Incremental indexer.
//!
//! Every public operation is its own unit of work: it takes the index writer,
//! commits on success or rolls back on failure, and releases the writer
//! before returning. Nothing holds the directory lock between calls, so other
//! handles and other processes can write in turn. Writes inside one process
//! are serialized on a mutex and block rather than fail.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tantivy::{IndexWriter, Term};
use tracing::{debug, info, warn};

use notes_types::DocumentRecord;

use crate::document::record_to_doc;
use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::SearchSchema;

/// Manages document indexing operations.
pub struct SearchIndexer {
    index: SearchIndex,
    schema: SearchSchema,
    gate: Mutex<()>,
}

impl SearchIndexer {
    /// Create a new indexer from a SearchIndex.
    ///
    /// Does not touch the directory lock; each write acquires it.
    pub fn new(index: &SearchIndex) -> Result<Self, SearchError> {
        Ok(Self {
            schema: index.schema().clone(),
            index: index.clone(),
            gate: Mutex::new(()),
        })
    }

    // The gate guards no data, so a panicked holder leaves nothing to repair
    fn serialize(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` against a fresh writer and commit, or roll back if anything
    /// fails. The writer is released, background merges included, before
    /// this returns.
    fn transact<T>(
        &self,
        op: impl FnOnce(&mut IndexWriter) -> Result<T, SearchError>,
    ) -> Result<(T, u64), SearchError> {
        let _serialized = self.serialize();
        let mut writer = self.index.writer()?;

        let result = op(&mut writer).and_then(|value| {
            let opstamp = writer.commit()?;
            Ok((value, opstamp))
        });

        match result {
            Ok(done) => {
                if let Err(e) = writer.wait_merging_threads() {
                    warn!(error = %e, "Background merge failed");
                }
                self.index.reload()?;
                Ok(done)
            }
            Err(e) => {
                match writer.rollback() {
                    Ok(opstamp) => warn!(opstamp, error = %e, "Rolled back index changes"),
                    Err(rollback_err) => {
                        warn!(error = %e, rollback_error = %rollback_err, "Rollback failed")
                    }
                }
                Err(e)
            }
        }
    }

    fn validate(record: &DocumentRecord) -> Result<(), SearchError> {
        if record.path.trim().is_empty() {
            return Err(SearchError::InvalidDocument("empty path".into()));
        }
        Ok(())
    }

    fn path_term(&self, path: &str) -> Term {
        Term::from_field_text(self.schema.path, path)
    }

    /// Insert or replace the document keyed by `record.path`.
    pub fn upsert(&self, record: &DocumentRecord) -> Result<u64, SearchError> {
        Self::validate(record)?;
        let doc = record_to_doc(&self.schema, record);
        let term = self.path_term(&record.path);

        let ((), opstamp) = self.transact(|writer| {
            writer.delete_term(term);
            writer.add_document(doc)?;
            Ok(())
        })?;

        info!(path = %record.path, opstamp, "Indexed document");
        Ok(opstamp)
    }

    /// Remove every document whose path equals `path`.
    pub fn delete(&self, path: &str) -> Result<u64, SearchError> {
        let term = self.path_term(path);

        let ((), opstamp) = self.transact(|writer| {
            writer.delete_term(term);
            Ok(())
        })?;

        info!(path, opstamp, "Deleted document");
        Ok(opstamp)
    }

    /// Remove many paths with a single commit.
    pub fn batch_delete(&self, paths: &[String]) -> Result<usize, SearchError> {
        if paths.is_empty() {
            return Ok(0);
        }

        let ((), opstamp) = self.transact(|writer| {
            for path in paths {
                writer.delete_term(self.path_term(path));
            }
            Ok(())
        })?;

        info!(count = paths.len(), opstamp, "Deleted document batch");
        Ok(paths.len())
    }

    /// Upsert many records with a single commit.
    ///
    /// Records that fail validation are logged and skipped. A writer failure
    /// rolls back the whole batch. Returns the number of records queued.
    pub fn batch_upsert(&self, records: &[DocumentRecord]) -> Result<usize, SearchError> {
        if records.is_empty() {
            return Ok(0);
        }

        let (count, opstamp) = self.transact(|writer| {
            let mut count = 0;
            for record in records {
                if let Err(e) = Self::validate(record) {
                    warn!(path = %record.path, error = %e, "Skipping document in batch");
                    continue;
                }
                writer.delete_term(self.path_term(&record.path));
                writer.add_document(record_to_doc(&self.schema, record))?;
                count += 1;
            }
            Ok(count)
        })?;

        info!(count, total = records.len(), opstamp, "Indexed document batch");
        Ok(count)
    }

    /// Remove every document.
    pub fn clear(&self) -> Result<u64, SearchError> {
        let ((), opstamp) = self.transact(|writer| {
            writer.delete_all_documents()?;
            Ok(())
        })?;

        warn!(opstamp, "Cleared search index");
        Ok(opstamp)
    }

    /// Merge all searchable segments into one and drop obsolete files.
    ///
    /// Returns the number of segments merged; 0 when there was nothing to do.
    pub fn optimize(&self) -> Result<usize, SearchError> {
        let _serialized = self.serialize();

        let segment_ids = self.index.index().searchable_segment_ids()?;
        if segment_ids.len() < 2 {
            debug!(segments = segment_ids.len(), "Nothing to merge");
            return Ok(0);
        }

        let mut writer = self.index.writer()?;
        writer.merge(&segment_ids).wait()?;
        writer.garbage_collect_files().wait()?;
        writer.wait_merging_threads()?;

        self.index.reload()?;
        info!(merged = segment_ids.len(), "Optimized search index");
        Ok(segment_ids.len())
    }

    /// Opstamp of the last commit, from any process.
    pub fn commit_opstamp(&self) -> Result<u64, SearchError> {
        Ok(self.index.index().load_metas()?.opstamp)
    }
}
