//! In-process overlap control for scheduled jobs.
//!
//! The cross-process reindex lock lives in `notes-indexing`; this guard only
//! stops a second tick of the same job inside one daemon from starting while
//! the previous tick is still running.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What to do when a tick fires while the previous one is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the new tick.
    #[default]
    Skip,
    /// Run ticks side by side.
    Concurrent,
}

/// Tracks whether a job is running and how many ticks were dropped.
#[derive(Debug)]
pub struct OverlapGuard {
    running: Arc<AtomicBool>,
    skipped: AtomicU64,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            skipped: AtomicU64::new(0),
            policy,
        }
    }

    /// Claim the job for one run.
    ///
    /// `None` means the tick must be skipped. Under `Concurrent` every call
    /// succeeds and the returned guard does not touch the shared flag.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        match self.policy {
            OverlapPolicy::Skip => {
                if self
                    .running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    Some(RunGuard {
                        flag: Some(self.running.clone()),
                    })
                } else {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
            OverlapPolicy::Concurrent => Some(RunGuard { flag: None }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ticks dropped because a run was in progress.
    pub fn skipped_runs(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// Clears the running flag on drop, including when the job panics.
#[derive(Debug)]
pub struct RunGuard {
    flag: Option<Arc<AtomicBool>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(flag) = &self.flag {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_skip_blocks_second_run() {
        let guard = OverlapGuard::new(OverlapPolicy::Skip);

        let first = guard.try_acquire();
        assert!(first.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());
        assert_eq!(guard.skipped_runs(), 1);

        drop(first);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_concurrent_allows_multiple() {
        let guard = OverlapGuard::new(OverlapPolicy::Concurrent);

        let runs: Vec<_> = (0..3).map(|_| guard.try_acquire()).collect();
        assert!(runs.iter().all(Option::is_some));
        assert!(!guard.is_running());
        assert_eq!(guard.skipped_runs(), 0);
    }

    #[test]
    fn test_skip_across_threads() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Skip));
        let held = guard.try_acquire().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                thread::spawn(move || guard.try_acquire().is_some())
            })
            .collect();
        let acquired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(acquired, 0);
        assert_eq!(guard.skipped_runs(), 8);

        drop(held);
        assert!(!guard.is_running());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Skip));
        let inner = guard.clone();

        let result = thread::spawn(move || {
            let _run = inner.try_acquire().unwrap();
            panic!("job failed");
        })
        .join();

        assert!(result.is_err());
        assert!(!guard.is_running());
    }

    #[test]
    fn test_policy_serialization() {
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Skip);
        assert_eq!(serde_json::to_string(&OverlapPolicy::Skip).unwrap(), r#""skip""#);
        let parsed: OverlapPolicy = serde_json::from_str(r#""concurrent""#).unwrap();
        assert_eq!(parsed, OverlapPolicy::Concurrent);
    }
}
