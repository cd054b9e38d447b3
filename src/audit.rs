//! Durable audit log for decisions, execution attempts and supervisor
//! transitions.
//!
//! Stores JSONL entries under the state directory so every invocation's
//! choices and outcomes remain inspectable after the process exits. Each
//! entry is mirrored to `tracing` at the matching level.
//!
//! Once the file reaches its size limit it is renamed to `<name>.1`,
//! replacing the previous generation, and a fresh file is started. At most
//! two generations exist on disk.

use crate::error::{Result, VigilError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Default size at which the log rotates.
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Entry severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// One persisted audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Emitting component (`orchestrator`, `runner`, `health`, `watchdog`).
    pub component: String,
    /// Short machine-friendly event name.
    pub event: String,
    /// Human-readable detail.
    pub detail: String,
    /// Correlates all entries written by one invocation.
    pub invocation_id: String,
}

/// Append-only audit trail bound to one invocation.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    invocation_id: String,
    max_bytes: u64,
}

impl AuditLog {
    /// Audit log at `path` with a fresh invocation id.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            invocation_id: uuid::Uuid::new_v4().to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Rotate once the current file reaches `max_bytes`.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous generation, written before the last rotation.
    pub fn rotated_path(&self) -> PathBuf {
        previous_generation(&self.path)
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Record an event. Write failures are logged and otherwise ignored so
    /// auditing never aborts the invocation it describes.
    pub fn record(
        &self,
        severity: Severity,
        component: &str,
        event: &str,
        detail: impl Into<String>,
    ) {
        let detail = detail.into();
        match severity {
            Severity::Info => tracing::info!(component, event, "{detail}"),
            Severity::Warning => tracing::warn!(component, event, "{detail}"),
            Severity::Error => tracing::error!(component, event, "{detail}"),
        }

        let entry = AuditEntry {
            timestamp: Utc::now(),
            severity,
            component: component.to_owned(),
            event: event.to_owned(),
            detail,
            invocation_id: self.invocation_id.clone(),
        };
        if let Err(e) = self.append(&entry) {
            tracing::error!(path = %self.path.display(), "audit write failed: {e}");
        }
    }

    pub fn info(&self, component: &str, event: &str, detail: impl Into<String>) {
        self.record(Severity::Info, component, event, detail);
    }

    pub fn warn(&self, component: &str, event: &str, detail: impl Into<String>) {
        self.record(Severity::Warning, component, event, detail);
    }

    pub fn error(&self, component: &str, event: &str, detail: impl Into<String>) {
        self.record(Severity::Error, component, event, detail);
    }

    /// Append `entry` as one JSON line and fsync, rotating first if the file
    /// is full.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is a symlink, or any filesystem step fails.
    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let canonical_parent = parent.canonicalize()?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| VigilError::Audit("audit path has no filename".to_owned()))?;
        let anchored_path = canonical_parent.join(file_name);

        if let Ok(meta) = std::fs::symlink_metadata(&anchored_path)
            && meta.file_type().is_symlink()
        {
            return Err(VigilError::Audit("audit path cannot be a symlink".to_owned()));
        }
        self.rotate_if_full(&anchored_path)?;

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600).custom_flags(libc::O_NOFOLLOW);
        }

        let mut file = options.open(&anchored_path)?;
        let mut line = serde_json::to_string(entry)
            .map_err(|e| VigilError::Audit(format!("audit serialization failed: {e}")))?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn rotate_if_full(&self, current: &Path) -> Result<()> {
        let len = match std::fs::metadata(current) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(VigilError::Io(e)),
        };
        if len < self.max_bytes {
            return Ok(());
        }
        match std::fs::rename(current, previous_generation(current)) {
            Ok(()) => {
                tracing::info!(path = %current.display(), bytes = len, "audit log rotated");
                Ok(())
            }
            // Another invocation rotated first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VigilError::Io(e)),
        }
    }

    /// The newest `limit` entries, oldest first, spanning the rotated
    /// generation when the current file holds fewer. Malformed lines are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if either file exists but cannot be opened.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tail: VecDeque<AuditEntry> = VecDeque::with_capacity(limit);
        read_tail(&self.rotated_path(), limit, &mut tail)?;
        read_tail(&self.path, limit, &mut tail)?;
        Ok(tail.into_iter().collect())
    }
}

fn previous_generation(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".1");
    path.with_file_name(name)
}

/// Push entries from `path` onto `tail`, keeping at most `limit`.
fn read_tail(path: &Path, limit: usize, tail: &mut VecDeque<AuditEntry>) -> Result<()> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(VigilError::Io(e)),
    };

    for line in BufReader::new(file).lines() {
        let Ok(line) = line else {
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(trimmed) {
            Ok(entry) => {
                if tail.len() == limit {
                    tail.pop_front();
                }
                tail.push_back(entry);
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed audit line");
            }
        }
    }
    Ok(())
}
