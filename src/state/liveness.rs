//! Timestamp of the last successful worker interaction.

use super::document::JsonDocument;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessRecord {
    pub last_success: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LivenessStore {
    doc: JsonDocument<LivenessRecord>,
}

impl LivenessStore {
    pub fn new(path: &Path) -> Self {
        Self {
            doc: JsonDocument::new(path, "liveness record"),
        }
    }

    /// `None` when nothing has succeeded yet or the record is unreadable.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        match self.doc.load() {
            Ok(record) => record.map(|r| r.last_success),
            Err(e) => {
                tracing::warn!("{e}; ignoring liveness record");
                None
            }
        }
    }

    /// Record a successful interaction at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn stamp(&self, now: DateTime<Utc>) -> Result<()> {
        self.doc.save(&LivenessRecord { last_success: now })
    }
}
