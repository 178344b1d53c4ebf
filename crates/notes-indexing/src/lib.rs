//! Vault access, bulk reindexing and the search facade.
//!
//! ## Key Components
//!
//! - [`VaultStore`]: markdown vaults on disk, one directory per tenant
//! - [`ReindexLock`]: cross-process lock around bulk reindex runs
//! - [`ReindexOrchestrator`]: incremental bulk reindex with cancellation
//! - [`NoteSearch`]: the facade handlers and jobs call
//!
//! ## Example
//!
//! ```ignore
//! use notes_indexing::NoteSearch;
//! use tokio_util::sync::CancellationToken;
//!
//! let search = NoteSearch::from_settings(&settings)?;
//! search.index_markdown("user_1/notes/a.md", "# Title\nHello #world");
//!
//! let summary = search.reindex_all(&CancellationToken::new())?;
//! println!("indexed {} notes", summary.indexed);
//! ```

pub mod error;
pub mod lock;
pub mod reindex;
pub mod service;
pub mod vault;

pub use error::IndexingError;
pub use lock::{read_lock_info, LockInfo, ReindexLock, LOCK_FILE_NAME};
pub use reindex::{
    is_current, LoggingProgressCallback, NoOpProgressCallback, ProgressCallback, ReindexConfig,
    ReindexOrchestrator, ReindexProgress, ReindexState, ReindexSummary, DEFAULT_BATCH_SIZE,
    DEFAULT_LOCK_STALE_AFTER,
};
pub use service::NoteSearch;
pub use vault::VaultStore;
