//! Bulk reindex of every tenant vault.
//!
//! Compares each file's modification time with the indexed snapshot and
//! re-indexes only new or changed notes. Runs under a cross-process
//! [`ReindexLock`] and stops between documents when cancelled.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use notes_search::{record_from_markdown, NoteSearcher, SearchIndex, SearchIndexer};
use notes_types::{index_precision, DocumentRecord, DocumentStore};

use crate::error::IndexingError;
use crate::lock::{ReindexLock, LOCK_FILE_NAME};

/// Documents per batch commit, and per progress report.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Age after which an abandoned lock is reclaimed (6 hours).
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

/// Reindex run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexState {
    Idle,
    Scanning,
    Indexing,
    Done,
    Cancelled,
    /// Another process holds the lock
    Skipped,
}

impl ReindexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexState::Idle => "idle",
            ReindexState::Scanning => "scanning",
            ReindexState::Indexing => "indexing",
            ReindexState::Done => "done",
            ReindexState::Cancelled => "cancelled",
            ReindexState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ReindexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for bulk reindex runs.
#[derive(Debug, Clone)]
pub struct ReindexConfig {
    /// Lock file shared by every process indexing into the same directory.
    pub lock_path: PathBuf,
    /// Documents queued before a batch commit.
    pub batch_size: usize,
    /// A lock older than this is considered abandoned.
    pub stale_after: Duration,
    /// Delete index entries whose file no longer exists.
    pub prune_missing: bool,
}

impl ReindexConfig {
    /// Config with the lock placed inside `index_dir`.
    pub fn for_index_dir(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: index_dir.into().join(LOCK_FILE_NAME),
            batch_size: DEFAULT_BATCH_SIZE,
            stale_after: DEFAULT_LOCK_STALE_AFTER,
            prune_missing: true,
        }
    }

    /// Set the batch size (at least 1).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_prune_missing(mut self, prune: bool) -> Self {
        self.prune_missing = prune;
        self
    }
}

/// Running counters of a reindex pass.
#[derive(Debug, Clone, Default)]
pub struct ReindexProgress {
    /// Documents decided so far (queued, skipped or failed).
    pub total_processed: u64,
    /// Documents committed to the index.
    pub indexed: u64,
    /// Documents whose indexed copy is current.
    pub skipped: u64,
    /// Documents, tenants or batches that failed.
    pub errors: u64,
    /// Index entries removed because their file is gone.
    pub removed: u64,
    /// Documents waiting for the next batch commit.
    pub queued: u64,
    pub completed: bool,
}

impl ReindexProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document queued for the next batch.
    pub fn record_queued(&mut self) {
        self.queued += 1;
        self.total_processed += 1;
    }

    /// Record the outcome of a batch commit.
    pub fn record_flushed(&mut self, indexed: u64, failed: u64) {
        self.queued = self.queued.saturating_sub(indexed + failed);
        self.indexed += indexed;
        self.errors += failed;
    }

    /// Record a document whose indexed copy is current.
    pub fn record_skip(&mut self) {
        self.skipped += 1;
        self.total_processed += 1;
    }

    /// Record a failure.
    pub fn record_error(&mut self) {
        self.errors += 1;
        self.total_processed += 1;
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// Outcome of one reindex run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexSummary {
    pub state: ReindexState,
    pub duration_ms: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub removed: u64,
    pub docs_per_sec: f64,
    pub index_size_mb: Option<f64>,
    pub segments: Option<usize>,
}

impl ReindexSummary {
    fn new(state: ReindexState, elapsed: Duration, progress: &ReindexProgress) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            state,
            duration_ms: elapsed.as_millis() as u64,
            indexed: progress.indexed,
            skipped: progress.skipped,
            errors: progress.errors,
            removed: progress.removed,
            docs_per_sec: if secs > 0.0 {
                progress.indexed as f64 / secs
            } else {
                0.0
            },
            index_size_mb: None,
            segments: None,
        }
    }
}

/// Trait for receiving reindex progress updates.
pub trait ProgressCallback: Send {
    /// Called after every document decision and once at the end.
    fn on_progress(&self, progress: &ReindexProgress);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _progress: &ReindexProgress) {}
}

/// A callback that logs progress at info level every `batch_size` documents.
pub struct LoggingProgressCallback {
    batch_size: usize,
}

impl LoggingProgressCallback {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, progress: &ReindexProgress) {
        if progress.completed
            || (progress.total_processed > 0
                && progress
                    .total_processed
                    .is_multiple_of(self.batch_size as u64))
        {
            info!(
                total = progress.total_processed,
                indexed = progress.indexed,
                queued = progress.queued,
                skipped = progress.skipped,
                errors = progress.errors,
                "Reindex progress"
            );
        }
    }
}

/// Whether the indexed copy is at least as new as the file.
pub fn is_current(indexed: Option<&DateTime<Utc>>, modified: DateTime<Utc>) -> bool {
    indexed.is_some_and(|indexed| *indexed >= index_precision(modified))
}

/// Drives one reindex pass over a [`DocumentStore`].
pub struct ReindexOrchestrator<'a> {
    index: &'a SearchIndex,
    indexer: &'a SearchIndexer,
    searcher: &'a NoteSearcher,
    store: &'a dyn DocumentStore,
    config: ReindexConfig,
    state: ReindexState,
}

impl<'a> ReindexOrchestrator<'a> {
    pub fn new(
        index: &'a SearchIndex,
        indexer: &'a SearchIndexer,
        searcher: &'a NoteSearcher,
        store: &'a dyn DocumentStore,
        config: ReindexConfig,
    ) -> Self {
        Self {
            index,
            indexer,
            searcher,
            store,
            config,
            state: ReindexState::Idle,
        }
    }

    pub fn state(&self) -> ReindexState {
        self.state
    }

    fn transition(&mut self, next: ReindexState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Reindex state");
            self.state = next;
        }
    }

    /// Run one pass.
    ///
    /// Lock contention is not an error: the summary comes back `Skipped`.
    /// Only failures that make the whole pass meaningless (snapshot or tenant
    /// listing) are returned as `Err`.
    pub fn run<P: ProgressCallback>(
        &mut self,
        cancel: &CancellationToken,
        callback: &P,
    ) -> Result<ReindexSummary, IndexingError> {
        let start = Instant::now();
        let mut progress = ReindexProgress::new();

        let Some(_lock) = ReindexLock::try_acquire(&self.config.lock_path, self.config.stale_after)?
        else {
            info!(lock = %self.config.lock_path.display(), "Reindex already running elsewhere, skipping");
            self.transition(ReindexState::Skipped);
            return Ok(ReindexSummary::new(ReindexState::Skipped, start.elapsed(), &progress));
        };

        self.transition(ReindexState::Scanning);
        // Commits from other processes must be in the snapshot
        self.index
            .reload()
            .inspect_err(|e| error!(error = %e, "Cannot reload index, aborting reindex"))?;
        let snapshot = self
            .searcher
            .snapshot()
            .inspect_err(|e| error!(error = %e, "Cannot snapshot index, aborting reindex"))?;
        let tenants = self
            .store
            .tenants()
            .inspect_err(|e| error!(error = %e, "Cannot list tenants, aborting reindex"))?;
        info!(
            tenants = tenants.len(),
            indexed_documents = snapshot.len(),
            "Starting reindex"
        );

        let mut pending: Vec<DocumentRecord> = Vec::with_capacity(self.config.batch_size);
        let mut seen = HashSet::new();
        let mut listing_complete = true;
        let mut cancelled = false;

        'tenants: for tenant in tenants {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let tenant = match tenant {
                Ok(tenant) => tenant,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed tenant entry");
                    progress.record_error();
                    continue;
                }
            };
            let files = match self.store.list_all(&tenant) {
                Ok(files) => files,
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Cannot list vault");
                    progress.record_error();
                    listing_complete = false;
                    continue;
                }
            };

            self.transition(ReindexState::Indexing);
            for entry in files {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'tenants;
                }
                seen.insert(entry.path.clone());

                if is_current(snapshot.get(&entry.path), entry.modified) {
                    progress.record_skip();
                } else {
                    match self.store.read(&entry.path) {
                        Ok(file) => {
                            pending.push(record_from_markdown(&file.path, &file.content, file.modified));
                            progress.record_queued();
                        }
                        Err(e) => {
                            warn!(path = %entry.path, error = %e, "Failed to read note");
                            progress.record_error();
                        }
                    }
                }

                if pending.len() >= self.config.batch_size {
                    self.flush(&mut pending, &mut progress);
                }
                callback.on_progress(&progress);
            }
        }

        // Commit whatever is queued, cancelled or not
        self.flush(&mut pending, &mut progress);

        if !cancelled && listing_complete && self.config.prune_missing {
            self.prune(&snapshot.into_keys().collect::<Vec<_>>(), &seen, &mut progress);
        }

        let state = if cancelled {
            info!(indexed = progress.indexed, "Reindex cancelled");
            ReindexState::Cancelled
        } else {
            if progress.indexed > 0 || progress.removed > 0 {
                if let Err(e) = self.indexer.optimize() {
                    warn!(error = %e, "Optimize after reindex failed");
                }
            }
            ReindexState::Done
        };
        self.transition(state);

        progress.mark_completed();
        callback.on_progress(&progress);

        let stats = self.index.detailed_stats();
        let summary = ReindexSummary {
            index_size_mb: stats.index_size_mb,
            segments: stats.segments,
            ..ReindexSummary::new(state, start.elapsed(), &progress)
        };

        info!(
            state = %summary.state,
            duration_ms = summary.duration_ms,
            indexed = summary.indexed,
            skipped = summary.skipped,
            errors = summary.errors,
            removed = summary.removed,
            docs_per_sec = summary.docs_per_sec,
            index_size_mb = ?summary.index_size_mb,
            segments = ?summary.segments,
            "Reindex finished"
        );
        Ok(summary)
    }

    fn flush(&self, pending: &mut Vec<DocumentRecord>, progress: &mut ReindexProgress) {
        if pending.is_empty() {
            return;
        }

        let total = pending.len() as u64;
        match self.indexer.batch_upsert(pending) {
            Ok(count) => progress.record_flushed(count as u64, total - count as u64),
            Err(e) => {
                warn!(count = total, error = %e, "Batch commit failed");
                progress.record_flushed(0, total);
            }
        }
        pending.clear();
    }

    fn prune(&self, indexed: &[String], seen: &HashSet<String>, progress: &mut ReindexProgress) {
        let missing: Vec<String> = indexed
            .iter()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();
        if missing.is_empty() {
            return;
        }

        match self.indexer.batch_delete(&missing) {
            Ok(count) => {
                info!(count, "Removed entries for deleted notes");
                progress.removed += count as u64;
            }
            Err(e) => {
                warn!(count = missing.len(), error = %e, "Failed to remove entries for deleted notes");
                progress.errors += missing.len() as u64;
            }
        }
    }
}
