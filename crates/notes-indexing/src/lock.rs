//! Cross-process lock for bulk reindexing.
//!
//! A JSON lock file created with `create_new`, so exactly one process can
//! hold it. A lock left behind by a dead process, or older than the stale
//! threshold, is reclaimed once. The guard removes the file on drop.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::IndexingError;

/// File name of the lock inside the index directory.
pub const LOCK_FILE_NAME: &str = "reindex.lock";

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            hostname: current_hostname(),
            acquired_at: Utc::now(),
        }
    }

    fn is_stale(&self, stale_after: Duration) -> bool {
        let max_age = TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX);
        if Utc::now().signed_duration_since(self.acquired_at) > max_age {
            return true;
        }
        // Process ids are only meaningful on the host that wrote them
        self.hostname == current_hostname() && !is_process_running(self.pid)
    }
}

/// Held reindex lock; released on drop.
#[derive(Debug)]
pub struct ReindexLock {
    path: PathBuf,
    info: LockInfo,
}

impl ReindexLock {
    /// Try once, without waiting, to take the lock at `path`.
    ///
    /// Returns `Ok(None)` when another live holder owns it.
    pub fn try_acquire(path: &Path, stale_after: Duration) -> Result<Option<Self>, IndexingError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        for attempt in 0..2 {
            match Self::create(path) {
                Ok(lock) => return Ok(Some(lock)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(IndexingError::Lock(format!("{}: {e}", path.display())));
                }
            }

            if attempt > 0 || !Self::holder_is_stale(path, stale_after) {
                debug!(path = %path.display(), "Reindex lock is held");
                return Ok(None);
            }

            match fs::remove_file(path) {
                Ok(()) => info!(path = %path.display(), "Reclaimed stale reindex lock"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(IndexingError::Lock(format!("{}: {e}", path.display())));
                }
            }
        }

        Ok(None)
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let info = LockInfo::current();
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;

        let written = serde_json::to_vec_pretty(&info)
            .map_err(std::io::Error::other)
            .and_then(|bytes| {
                file.write_all(&bytes)?;
                file.sync_all()
            });
        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(e);
        }

        debug!(path = %path.display(), pid = info.pid, "Acquired reindex lock");
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    fn holder_is_stale(path: &Path, stale_after: Duration) -> bool {
        match read_lock_info(path) {
            Ok(holder) => {
                let stale = holder.is_stale(stale_after);
                if stale {
                    warn!(
                        pid = holder.pid,
                        hostname = %holder.hostname,
                        acquired_at = %holder.acquired_at,
                        "Found stale reindex lock"
                    );
                }
                stale
            }
            // Unreadable lock files are judged by their own age
            Err(e) => {
                let stale = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| modified.elapsed().ok())
                    .is_some_and(|age| age > stale_after);
                warn!(path = %path.display(), error = %e, stale, "Unreadable reindex lock");
                stale
            }
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ReindexLock {
    fn drop(&mut self) {
        // Leave the file alone if someone reclaimed it from us
        match read_lock_info(&self.path) {
            Ok(current) if current == self.info => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "Failed to release reindex lock");
                } else {
                    debug!(path = %self.path.display(), "Released reindex lock");
                }
            }
            Ok(_) => warn!(path = %self.path.display(), "Reindex lock taken over, not removing"),
            Err(e) => debug!(path = %self.path.display(), error = %e, "Reindex lock already gone"),
        }
    }
}

/// Read the holder recorded in a lock file.
pub fn read_lock_info(path: &Path) -> Result<LockInfo, IndexingError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn current_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 only checks existence; EPERM means it exists under another user
    let delivered = unsafe { libc::kill(pid, 0) == 0 };
    delivered || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn write_info(path: &Path, info: &LockInfo) {
        fs::write(path, serde_json::to_string(info).unwrap()).unwrap();
    }

    #[test]
    fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index").join(LOCK_FILE_NAME);

        let lock = ReindexLock::try_acquire(&path, HOUR).unwrap().unwrap();
        assert!(path.exists());
        assert_eq!(lock.info().pid, std::process::id());
        assert_eq!(read_lock_info(&path).unwrap(), *lock.info());

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCK_FILE_NAME);

        let _held = ReindexLock::try_acquire(&path, HOUR).unwrap().unwrap();
        assert!(ReindexLock::try_acquire(&path, HOUR).unwrap().is_none());
        assert!(path.exists());
    }

    #[test]
    fn test_old_lock_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCK_FILE_NAME);
        write_info(
            &path,
            &LockInfo {
                pid: std::process::id(),
                hostname: "elsewhere".to_string(),
                acquired_at: Utc::now() - TimeDelta::hours(7),
            },
        );

        let lock = ReindexLock::try_acquire(&path, Duration::from_secs(6 * 3600))
            .unwrap()
            .unwrap();
        assert_eq!(read_lock_info(&path).unwrap(), *lock.info());
    }

    #[test]
    fn test_recent_foreign_lock_is_respected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCK_FILE_NAME);
        write_info(
            &path,
            &LockInfo {
                pid: 1,
                hostname: "another-host".to_string(),
                acquired_at: Utc::now(),
            },
        );

        assert!(ReindexLock::try_acquire(&path, HOUR).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_process_lock_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCK_FILE_NAME);

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        write_info(
            &path,
            &LockInfo {
                pid: dead_pid,
                hostname: current_hostname(),
                acquired_at: Utc::now(),
            },
        );

        assert!(ReindexLock::try_acquire(&path, HOUR).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_recent_lock_is_held() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCK_FILE_NAME);
        fs::write(&path, "not json").unwrap();
        assert!(ReindexLock::try_acquire(&path, HOUR).unwrap().is_none());

        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(std::time::SystemTime::now() - 2 * HOUR).unwrap();
        drop(file);
        assert!(ReindexLock::try_acquire(&path, HOUR).unwrap().is_some());
    }

    #[test]
    fn test_drop_keeps_reclaimed_lock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCK_FILE_NAME);

        let lock = ReindexLock::try_acquire(&path, HOUR).unwrap().unwrap();
        let other = LockInfo {
            pid: 1,
            hostname: "another-host".to_string(),
            acquired_at: Utc::now(),
        };
        write_info(&path, &other);

        drop(lock);
        assert_eq!(read_lock_info(&path).unwrap(), other);
    }

    #[cfg(unix)]
    #[test]
    fn test_is_process_running() {
        assert!(is_process_running(std::process::id()));
        assert!(!is_process_running(0));
        assert!(!is_process_running(u32::MAX));
    }
}
