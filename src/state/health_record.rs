//! Last observed worker health.

use super::document::JsonDocument;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// Alive marker seen, no dead marker.
    Healthy,
    /// Probe completed but output did not indicate a live worker.
    Unhealthy,
    /// Probe exceeded its deadline.
    Timeout,
    /// Probe could not be run.
    Error,
    /// Worker was restarted after a failed probe.
    Restarted,
}

impl HealthStatus {
    /// Only `Healthy` counts as healthy; probe errors behave like `Unhealthy`.
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Healthy => "HEALTHY",
            Self::Unhealthy => "UNHEALTHY",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
            Self::Restarted => "RESTARTED",
        };
        f.write_str(label)
    }
}

/// Persisted health observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Observed status.
    pub status: HealthStatus,
    /// When it was observed.
    pub observed_at: DateTime<Utc>,
}

/// Overwrite-only store for [`HealthRecord`].
#[derive(Debug, Clone)]
pub struct HealthRecordStore {
    doc: JsonDocument<HealthRecord>,
}

impl HealthRecordStore {
    /// Store at `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            doc: JsonDocument::new(path, "health record"),
        }
    }

    /// Last record, if any. Unreadable records are reported and ignored.
    pub fn load(&self) -> Option<HealthRecord> {
        self.doc.load().unwrap_or_else(|e| {
            tracing::warn!("{e}; ignoring health record");
            None
        })
    }

    /// Replace the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save(&self, status: HealthStatus, observed_at: DateTime<Utc>) -> Result<HealthRecord> {
        let record = HealthRecord {
            status,
            observed_at,
        };
        self.doc.save(&record)?;
        Ok(record)
    }
}
