//! Cross-invocation mutual exclusion via lock files.
//!
//! Invocations are separate processes started by an external timer, so an
//! in-process mutex is not enough. A lock is a file created with
//! `create_new`; whoever creates it owns the resource until the guard drops.
//! Lock files older than the stale threshold belong to a crashed invocation
//! and are evicted.
//!
//! Each lock file carries an owner token (`<pid> <uuid>`). A guard only
//! removes the file while it still holds its own token, so a holder that was
//! evicted as stale cannot release a lock that someone else has since taken.

use crate::error::{Result, VigilError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

/// Poll interval while waiting for a held lock.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Lock acquisition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Give up after waiting this long.
    pub wait_timeout: Duration,
    /// Treat lock files older than this as abandoned.
    pub stale_after: Duration,
}

impl LockPolicy {
    /// Build from the `[locks]` config section.
    pub fn from_config(config: &crate::config::LockConfig) -> Self {
        Self {
            wait_timeout: Duration::from_millis(config.wait_timeout_ms),
            stale_after: Duration::from_secs(config.stale_after_secs),
        }
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::from_config(&crate::config::LockConfig::default())
    }
}

/// Held lock. The lock file is removed on drop if this guard still owns it.
#[derive(Debug)]
pub struct FileLockGuard {
    path: PathBuf,
    token: String,
}

impl FileLockGuard {
    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(owner) if owner == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!(lock = %self.path.display(), "failed to release lock: {e}");
                }
            }
            Ok(owner) => tracing::warn!(
                lock = %self.path.display(),
                owner = %owner,
                "lock was taken over after eviction, leaving it in place"
            ),
            Err(e) => tracing::warn!(
                lock = %self.path.display(),
                "lock vanished before release: {e}"
            ),
        }
    }
}

/// Try once to take the lock at `path`.
///
/// Returns `Ok(None)` when another holder owns a fresh lock.
///
/// # Errors
///
/// Returns [`VigilError::Lock`] when the lock file cannot be created for any
/// reason other than already existing.
pub fn try_acquire(path: &Path, stale_after: Duration) -> Result<Option<FileLockGuard>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| VigilError::Lock(format!("cannot create lock directory: {e}")))?;
    }

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let token = format!("{} {}", std::process::id(), Uuid::new_v4());
            if let Err(e) = file.write_all(token.as_bytes()) {
                if let Err(cleanup) = std::fs::remove_file(path) {
                    tracing::warn!(
                        lock = %path.display(),
                        "cannot remove unwritten lock: {cleanup}"
                    );
                }
                return Err(VigilError::Lock(format!(
                    "cannot write lock {}: {e}",
                    path.display()
                )));
            }
            Ok(Some(FileLockGuard {
                path: path.to_path_buf(),
                token,
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            evict_stale_lock(path, stale_after);
            Ok(None)
        }
        Err(e) => Err(VigilError::Lock(format!(
            "cannot create lock {}: {e}",
            path.display()
        ))),
    }
}

/// Take the lock at `path`, waiting up to the policy timeout.
///
/// # Errors
///
/// Returns [`VigilError::Lock`] if the lock is still held when the wait
/// times out, or the lock file cannot be created.
pub async fn acquire(path: &Path, policy: LockPolicy) -> Result<FileLockGuard> {
    let started = Instant::now();
    loop {
        if let Some(guard) = try_acquire(path, policy.stale_after)? {
            tracing::debug!(lock = %path.display(), "lock acquired");
            return Ok(guard);
        }
        if started.elapsed() >= policy.wait_timeout {
            return Err(VigilError::Lock(format!(
                "timed out after {}ms waiting for {} (another invocation is running)",
                policy.wait_timeout.as_millis(),
                path.display()
            )));
        }
        tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
    }
}

fn evict_stale_lock(path: &Path, stale_after: Duration) {
    let age = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => match SystemTime::now().duration_since(modified) {
            Ok(age) => age,
            // Modified in the future: treat as fresh.
            Err(_) => return,
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(lock = %path.display(), "cannot inspect lock: {e}");
            return;
        }
    };
    if age < stale_after {
        return;
    }
    let Ok(stale_owner) = std::fs::read_to_string(path) else {
        return;
    };

    // Move the file aside first, then confirm it was the stale one. Another
    // invocation may have evicted and re-taken the lock in between.
    let aside = path.with_extension(format!("stale-{}", Uuid::new_v4()));
    if let Err(e) = std::fs::rename(path, &aside) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(lock = %path.display(), "cannot evict stale lock: {e}");
        }
        return;
    }
    match std::fs::read_to_string(&aside) {
        Ok(owner) if owner == stale_owner => {
            tracing::warn!(
                lock = %path.display(),
                age_secs = age.as_secs(),
                owner = %stale_owner,
                "evicted stale lock"
            );
        }
        _ => {
            // Not the file we judged stale: put it back unless someone has
            // already created a new lock.
            if let Err(e) = std::fs::hard_link(&aside, path) {
                tracing::warn!(lock = %path.display(), "cannot restore live lock: {e}");
            }
        }
    }
    if let Err(e) = std::fs::remove_file(&aside) {
        tracing::warn!(lock = %aside.display(), "cannot remove evicted lock: {e}");
    }
}
