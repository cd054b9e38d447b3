//! Snapshot of every persisted document for operators.

use crate::audit::{AuditEntry, AuditLog};
use crate::state::{CrashBudget, HealthRecord, OrchestratorState, StateStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub data_dir: PathBuf,
    pub orchestrator: OrchestratorState,
    /// Crash budget with window expiry applied; `None` when empty.
    pub crash_budget: Option<CrashBudget>,
    pub health: Option<HealthRecord>,
    pub last_success: Option<DateTime<Utc>>,
    pub recent_audit: Vec<AuditEntry>,
}

impl StatusReport {
    /// Gather the report. Unreadable documents show up as empty.
    pub fn collect(
        store: &StateStore,
        audit: &AuditLog,
        now: DateTime<Utc>,
        audit_limit: usize,
    ) -> Self {
        let recent_audit = audit.read_recent(audit_limit).unwrap_or_else(|e| {
            tracing::warn!("cannot read audit log: {e}");
            Vec::new()
        });
        Self {
            generated_at: now,
            data_dir: store.paths.root().to_path_buf(),
            orchestrator: store.orchestrator.load(),
            crash_budget: store.crash_budget.snapshot(now),
            health: store.health.load(),
            last_success: store.liveness.last_success(),
            recent_audit,
        }
    }
}
