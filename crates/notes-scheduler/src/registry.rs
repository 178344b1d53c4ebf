//! Per-job execution status.
//!
//! Every tick of a registered job ends in one [`JobResult`]; the registry
//! keeps the latest one plus running totals so the daemon can report them.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", content = "reason", rename_all = "lowercase")]
pub enum JobResult {
    Success,
    Failed(String),
    /// The tick did no work (overlap, lock held elsewhere).
    Skipped(String),
}

/// What a job hands back to the scheduler after a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutput {
    pub metadata: BTreeMap<String, String>,
    pub skip_reason: Option<String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tick that found nothing to do.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub cron_expr: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub is_running: bool,
    /// Counters reported by the last completed tick
    #[serde(default)]
    pub last_run_metadata: BTreeMap<String, String>,
}

impl JobStatus {
    fn new(job_name: &str, cron_expr: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            cron_expr: cron_expr.to_string(),
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            last_run_metadata: BTreeMap::new(),
        }
    }
}

/// Thread-safe map of job name to [`JobStatus`].
///
/// Updates for unregistered names are ignored.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<BTreeMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking job cannot leave a status half-written, so poisoning is ignored
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `job_name`, replacing any previous status.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.write()
            .insert(job_name.to_string(), JobStatus::new(job_name, cron_expr));
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = true;
        }
    }

    /// Record a finished tick.
    pub fn record_complete(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: BTreeMap<String, String>,
    ) {
        let mut jobs = self.write();
        let Some(status) = jobs.get_mut(job_name) else {
            return;
        };

        status.is_running = false;
        status.last_run = Some(Utc::now());
        status.last_duration_ms = Some(duration_ms);
        status.run_count += 1;
        match &result {
            JobResult::Failed(_) => status.error_count += 1,
            JobResult::Skipped(_) => status.skip_count += 1,
            JobResult::Success => {}
        }
        status.last_result = Some(result);
        status.last_run_metadata = metadata;
    }

    /// Record a tick dropped before it started; a run in progress is untouched.
    pub fn record_skipped(&self, job_name: &str, reason: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.skip_count += 1;
            status.last_result = Some(JobResult::Skipped(reason.to_string()));
        }
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// All statuses, ordered by job name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        self.read().values().cloned().collect()
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read().get(job_name).is_some_and(|s| s.is_running)
    }

    /// True while any registered job is mid-tick.
    pub fn any_running(&self) -> bool {
        self.read().values().any(|s| s.is_running)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}
