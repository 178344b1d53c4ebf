//! Background job scheduling for the notes search daemon.
//!
//! Wraps `tokio-cron-scheduler` with timezone-aware cron jobs (`chrono-tz`),
//! graceful shutdown through a `CancellationToken`, an in-process overlap
//! guard and a status registry.
//!
//! # Example
//!
//! ```ignore
//! use notes_scheduler::{register_reindex_job, ReindexJobConfig, SchedulerConfig, SchedulerService};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! register_reindex_job(&scheduler, search.clone(), ReindexJobConfig::default()).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod error;
pub mod jobs;
mod overlap;
mod registry;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use jobs::{register_reindex_job, run_reindex, ReindexJobConfig, REINDEX_JOB_NAME};
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{validate_cron_expression, SchedulerService};
