//! Scheduled bulk reindex.
//!
//! The orchestrator is synchronous and disk-bound, so each tick runs it on
//! the blocking pool. Cancellation comes from the scheduler's shutdown token
//! and is checked between documents.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use notes_indexing::{NoteSearch, ReindexState, ReindexSummary};
use notes_types::ReindexSettings;

use crate::{JobOutput, OverlapPolicy, SchedulerError, SchedulerService};

/// Registry name of the reindex job.
pub const REINDEX_JOB_NAME: &str = "bulk_reindex";

/// Schedule for the reindex job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexJobConfig {
    /// Cron expression (default: "0 0 3 * * *" = 03:00 daily)
    pub cron: String,
    /// Timezone the cron expression is evaluated in
    pub timezone: String,
}

impl Default for ReindexJobConfig {
    fn default() -> Self {
        Self::from_settings(&ReindexSettings::default())
    }
}

impl ReindexJobConfig {
    pub fn from_settings(settings: &ReindexSettings) -> Self {
        Self {
            cron: settings.schedule.clone(),
            timezone: settings.timezone.clone(),
        }
    }

    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = cron.into();
        self
    }
}

/// Register the bulk reindex with `scheduler`.
///
/// Overlapping ticks inside this process are skipped; other processes are
/// kept out by the reindex lock file.
pub async fn register_reindex_job(
    scheduler: &SchedulerService,
    search: Arc<NoteSearch>,
    config: ReindexJobConfig,
) -> Result<uuid::Uuid, SchedulerError> {
    scheduler
        .register_job(
            REINDEX_JOB_NAME,
            &config.cron,
            Some(&config.timezone),
            OverlapPolicy::Skip,
            move |cancel| {
                let search = search.clone();
                async move { run_reindex(search, cancel).await }
            },
        )
        .await
}

/// Run one reindex pass on the blocking pool and report it as a job outcome.
pub async fn run_reindex(
    search: Arc<NoteSearch>,
    cancel: CancellationToken,
) -> Result<JobOutput, String> {
    let summary = tokio::task::spawn_blocking(move || search.reindex_all(&cancel))
        .await
        .map_err(|e| format!("reindex task failed: {e}"))?
        .map_err(|e| e.to_string())?;

    info!(
        state = %summary.state,
        indexed = summary.indexed,
        skipped = summary.skipped,
        errors = summary.errors,
        "Scheduled reindex finished"
    );
    Ok(summary_output(&summary))
}

fn summary_output(summary: &ReindexSummary) -> JobOutput {
    let output = match summary.state {
        ReindexState::Skipped => JobOutput::skipped("reindex lock held by another process"),
        _ => JobOutput::new(),
    };
    output
        .with_metadata("state", summary.state)
        .with_metadata("indexed", summary.indexed)
        .with_metadata("skipped", summary.skipped)
        .with_metadata("errors", summary.errors)
        .with_metadata("removed", summary.removed)
}
