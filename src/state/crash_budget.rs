//! Time-windowed failure counter used as the supervisor's circuit breaker.
//!
//! A window opens at the first failure and closes `reset_period` later.
//! Reads apply the expiry first, so a stale count is never acted on.

use super::document::JsonDocument;
use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persisted failure window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashBudget {
    /// Failures recorded in the current window.
    pub count: u32,
    /// When the current window opened.
    pub window_start: DateTime<Utc>,
}

impl CrashBudget {
    /// `true` once `now - window_start` exceeds `reset_period`.
    pub fn is_expired(&self, now: DateTime<Utc>, reset_period: TimeDelta) -> bool {
        now - self.window_start > reset_period
    }

    /// Budget after one more failure at `now`.
    pub fn after_failure(
        current: Option<Self>,
        now: DateTime<Utc>,
        reset_period: TimeDelta,
    ) -> Self {
        match current {
            Some(budget) if !budget.is_expired(now, reset_period) => Self {
                count: budget.count.saturating_add(1),
                window_start: budget.window_start,
            },
            _ => Self {
                count: 1,
                window_start: now,
            },
        }
    }
}

/// Persistence and expiry policy for [`CrashBudget`].
#[derive(Debug, Clone)]
pub struct CrashBudgetStore {
    doc: JsonDocument<CrashBudget>,
    reset_period: TimeDelta,
}

impl CrashBudgetStore {
    /// Store at `path` with the given window length.
    pub fn new(path: &Path, reset_period: TimeDelta) -> Self {
        Self {
            doc: JsonDocument::new(path, "crash budget"),
            reset_period,
        }
    }

    /// Window length.
    pub fn reset_period(&self) -> TimeDelta {
        self.reset_period
    }

    /// Current budget with expiry applied. An expired window is deleted.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Option<CrashBudget> {
        let budget = match self.doc.load() {
            Ok(budget) => budget?,
            Err(e) => {
                tracing::warn!("{e}; treating crash budget as empty");
                return None;
            }
        };
        if budget.is_expired(now, self.reset_period) {
            tracing::info!(
                count = budget.count,
                window_start = %budget.window_start,
                "crash budget window expired, resetting"
            );
            if let Err(e) = self.doc.remove() {
                tracing::warn!("failed to remove expired crash budget: {e}");
            }
            return None;
        }
        Some(budget)
    }

    /// Effective failure count at `now`.
    pub fn read(&self, now: DateTime<Utc>) -> u32 {
        self.snapshot(now).map_or(0, |b| b.count)
    }

    /// Count one failure at `now` and return the updated budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn record_failure(&self, now: DateTime<Utc>) -> Result<CrashBudget> {
        let next = CrashBudget::after_failure(self.snapshot(now), now, self.reset_period);
        self.doc.save(&next)?;
        Ok(next)
    }

    /// Clear the budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be removed.
    pub fn reset(&self) -> Result<()> {
        self.doc.remove()
    }
}
