//! Process-wide exclusive advisory lock.
//!
//! The lock is an OS file lock on `<storage>/.lock`. Each acquisition opens
//! its own file handle, so the lock excludes other processes (CLI, portal
//! workers) as well as other tasks in this process.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{PkiError, Result};

/// Poll interval while waiting with a bounded timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The single global mutation gate.
#[derive(Debug, Clone)]
pub struct GlobalLock {
    path: PathBuf,
    timeout: Option<Duration>,
}

/// Held lock. Released on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl GlobalLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Block until the lock is held.
    ///
    /// The wait runs on the blocking pool so async callers never park a
    /// runtime worker.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let path = self.path.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || acquire_blocking(path, timeout))
            .await
            .map_err(|e| PkiError::io(&self.path, std::io::Error::other(e)))?
    }
}

fn acquire_blocking(path: PathBuf, timeout: Option<Duration>) -> Result<LockGuard> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| PkiError::io(&path, e))?;

    match timeout {
        None => file.lock().map_err(|e| PkiError::io(&path, e))?,
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                match file.try_lock() {
                    Ok(()) => break,
                    Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                        std::thread::sleep(POLL_INTERVAL);
                    }
                    Err(TryLockError::WouldBlock) => {
                        warn!(path = %path.display(), "global lock wait timed out");
                        return Err(PkiError::LockTimeout(limit.as_secs()));
                    }
                    Err(TryLockError::Error(e)) => return Err(PkiError::io(&path, e)),
                }
            }
        }
    }

    debug!(path = %path.display(), "global lock acquired");
    Ok(LockGuard { file, path })
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release global lock");
        } else {
            debug!(path = %self.path.display(), "global lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_bounded_wait_times_out_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        let holder = GlobalLock::new(&path, None);
        let waiter = GlobalLock::new(&path, Some(Duration::from_millis(100)));

        let guard = holder.acquire().await.unwrap();
        let err = waiter.acquire().await.unwrap_err();
        assert!(matches!(err, PkiError::LockTimeout(_)));

        drop(guard);
        assert!(waiter.acquire().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_critical_sections_never_overlap() {
        let dir = TempDir::new().unwrap();
        let lock = GlobalLock::new(dir.path().join(".lock"), None);
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let _guard = lock.acquire().await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
