//! Filesystem-based mutual exclusion.
//!
//! Exclusive directory creation is the locking primitive: it is atomic on
//! every platform and works across independent OS processes sharing a
//! data root, without a broker. A `pid` sidecar inside the marker names
//! the holder for timeout diagnostics.
//!
//! Acquisition is scoped: the returned [`LockGuard`] removes the marker
//! on [`LockGuard::release`] and again from `Drop`, so every exit path
//! (success, validation failure, panic unwind) releases the lock.

use cadastre_core::{CadastreError, Result, StoreConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Name of the lock serializing all registry mutations.
pub const REGISTRY_LOCK: &str = "registry";

/// A named cross-process mutex rooted in the config's lock directory.
pub struct MutexLock;

impl MutexLock {
    /// Acquire the named lock using the config's timeout and poll
    /// interval.
    pub async fn acquire(config: &StoreConfig, name: &str) -> Result<LockGuard> {
        Self::acquire_with(
            config.lock_dir(),
            name,
            config.lock_timeout,
            config.lock_poll_interval,
        )
        .await
    }

    /// Acquire with explicit bounds. Polls until the marker can be
    /// created; after `timeout` fails with the best-effort holder pid.
    pub async fn acquire_with(
        lock_dir: PathBuf,
        name: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<LockGuard> {
        fs::create_dir_all(&lock_dir).await?;
        let marker = lock_dir.join(format!("{}.lock", name));
        let pid_file = marker.join("pid");
        let start = Instant::now();
        loop {
            match fs::create_dir(&marker).await {
                Ok(()) => {
                    let _ = fs::write(&pid_file, std::process::id().to_string()).await;
                    debug!(lock = name, "acquired");
                    return Ok(LockGuard {
                        marker,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if start.elapsed() >= timeout {
                        let holder = fs::read_to_string(&pid_file)
                            .await
                            .map(|s| s.trim().to_string())
                            .unwrap_or_else(|_| "?".to_string());
                        warn!(lock = name, holder = %holder, "acquisition timed out");
                        return Err(CadastreError::lock_timeout(name, format!("pid {}", holder)));
                    }
                    sleep(poll_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Holds a named lock until released or dropped.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    marker: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Remove the marker, releasing the lock.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = fs::remove_dir_all(&self.marker).await {
            warn!(marker = %self.marker.display(), error = %e, "failed to remove lock marker");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_dir_all(&self.marker);
        }
    }
}
