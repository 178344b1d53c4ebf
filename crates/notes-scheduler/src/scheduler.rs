//! Scheduler service wrapper around tokio-cron-scheduler.
//!
//! Jobs get a clone of the shutdown token, run under an [`OverlapGuard`],
//! and report every tick to the shared [`JobRegistry`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::overlap::{OverlapGuard, OverlapPolicy};
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// Validate a 6-field cron expression (sec min hour day month weekday).
///
/// ```
/// use notes_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 3 * * *").is_ok());
/// assert!(validate_cron_expression("invalid").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{expr}': {e}")))
}

/// Owns the cron scheduler, the shutdown token and the job registry.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
    registry: Arc<JobRegistry>,
}

impl SchedulerService {
    /// Create a stopped scheduler. Call [`start`](Self::start) to run jobs.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
            registry: Arc::new(JobRegistry::new()),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Cancel running jobs, wait up to `shutdown_timeout_secs` for them to
    /// return, then stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Duration::from_secs(self.config.shutdown_timeout_secs);
        let registry = self.registry.clone();
        let drained = tokio::time::timeout(deadline, async move {
            while registry.any_running() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .is_ok();
        if !drained {
            warn!(
                timeout_secs = self.config.shutdown_timeout_secs,
                "Jobs still running at shutdown deadline"
            );
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error during scheduler shutdown");
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    /// Token cancelled at shutdown. Long jobs should poll it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a cron job.
    ///
    /// `timezone` falls back to the configured default. Each tick receives
    /// the shutdown token; its outcome lands in the registry under `name`.
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        policy: OverlapPolicy,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        let tz = match timezone {
            Some(tz_str) => Self::parse_timezone(tz_str)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        self.registry.register(name, cron_expr);
        let guard = Arc::new(OverlapGuard::new(policy));
        let registry = self.registry.clone();
        let shutdown_token = self.shutdown_token.clone();
        let job_name = name.to_string();

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let name = job_name.clone();
            let guard = guard.clone();
            let registry = registry.clone();
            let token = shutdown_token.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                run_tick(&name, &guard, &registry, token, &job_fn).await;
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }

    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }
}

/// One tick: overlap check, run, record.
async fn run_tick<F, Fut>(
    name: &str,
    guard: &OverlapGuard,
    registry: &JobRegistry,
    token: CancellationToken,
    job_fn: &F,
) where
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<JobOutput, String>>,
{
    if token.is_cancelled() {
        debug!(job = %name, "Shutdown in progress, not starting");
        return;
    }

    let Some(_run) = guard.try_acquire() else {
        info!(job = %name, "Previous run still active, skipping");
        registry.record_skipped(name, "previous run still active");
        return;
    };

    registry.record_start(name);
    info!(job = %name, "Job started");
    let start = Instant::now();

    let outcome = job_fn(token).await;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (result, metadata) = match outcome {
        Ok(JobOutput {
            metadata,
            skip_reason: Some(reason),
        }) => (JobResult::Skipped(reason), metadata),
        Ok(output) => (JobResult::Success, output.metadata),
        Err(e) => {
            error!(job = %name, error = %e, "Job failed");
            (JobResult::Failed(e), BTreeMap::new())
        }
    };

    info!(job = %name, duration_ms, result = ?result, "Job completed");
    registry.record_complete(name, result, duration_ms, metadata);
}
