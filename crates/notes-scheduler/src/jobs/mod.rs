//! Jobs the daemon registers with the scheduler.
//!
//! - **reindex**: cron-driven incremental bulk reindex of every vault

pub mod reindex;

pub use reindex::{register_reindex_job, run_reindex, ReindexJobConfig, REINDEX_JOB_NAME};
