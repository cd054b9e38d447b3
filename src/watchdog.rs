//! Watchdog: liveness check, crash budget and graduated recovery.
//!
//! One [`Watchdog::monitor`] call per invocation:
//!
//! 1. No liveness record yet: stamp one and stop (first run).
//! 2. Last success within the liveness threshold: nothing to do. A last
//!    success in the future is re-stamped at now and falls through to the
//!    probe.
//! 3. Otherwise probe the worker directly. Healthy: nothing to do.
//! 4. Otherwise [`Watchdog::perform_recovery`]: refuse and escalate when the
//!    crash budget is spent, else count the failure and hard-restart.

use crate::audit::AuditLog;
use crate::config::{RestartConfig, WatchdogConfig};
use crate::error::Result;
use crate::health::HealthMonitor;
use crate::state::{CrashBudgetStore, HealthStatus, LivenessStore};
use crate::worker::{RestartMode, Worker, WorkerError, restart_worker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

const COMPONENT: &str = "watchdog";

/// What one monitor pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WatchdogReport {
    /// First run; liveness record created.
    Started,
    /// Recent success; no probe needed.
    Alive { idle_secs: i64 },
    /// Idle too long but the probe passed.
    ProbeHealthy { idle_secs: i64 },
    /// Probe failed and the worker was restarted.
    Recovered { probe: HealthStatus },
    /// Probe failed and the restart failed too.
    RecoveryFailed { probe: HealthStatus, reason: String },
    /// Probe failed and the crash budget is spent.
    Escalated { count: u32, max: u32 },
}

/// Outcome of [`Watchdog::perform_recovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Restarted,
    RestartFailed { reason: String },
}

pub struct Watchdog {
    worker: Arc<dyn Worker>,
    health: HealthMonitor,
    crash_budget: CrashBudgetStore,
    liveness: LivenessStore,
    policy: WatchdogConfig,
    restart: RestartConfig,
    audit: AuditLog,
}

impl Watchdog {
    pub fn new(
        worker: Arc<dyn Worker>,
        health: HealthMonitor,
        crash_budget: CrashBudgetStore,
        liveness: LivenessStore,
        policy: WatchdogConfig,
        restart: RestartConfig,
        audit: AuditLog,
    ) -> Self {
        Self {
            worker,
            health,
            crash_budget,
            liveness,
            policy,
            restart,
            audit,
        }
    }

    /// Run one supervision pass.
    ///
    /// # Errors
    ///
    /// Returns an error only when a state document cannot be written.
    pub async fn monitor(&self, now: DateTime<Utc>) -> Result<WatchdogReport> {
        let Some(last_success) = self.liveness.last_success() else {
            self.liveness.stamp(now)?;
            self.audit.info(COMPONENT, "started", "watchdog started");
            return Ok(WatchdogReport::Started);
        };

        let idle = now - last_success;
        let idle_secs = idle.num_seconds().max(0);
        if last_success > now {
            // Clock stepped backwards; re-anchor the record and probe.
            self.audit.warn(
                COMPONENT,
                "clock_skew",
                format!("last success {last_success} is later than now ({now}), probing"),
            );
            self.liveness.stamp(now)?;
        } else if idle <= crate::clock::delta_secs(self.policy.liveness_threshold_secs) {
            tracing::debug!(idle_secs, "worker recently active");
            return Ok(WatchdogReport::Alive { idle_secs });
        } else {
            self.audit.warn(
                COMPONENT,
                "idle",
                format!("no successful operation for {:.1} minutes", idle_secs as f64 / 60.0),
            );
        }

        let probe = self.health.probe().await;
        if probe.is_healthy() {
            return Ok(WatchdogReport::ProbeHealthy { idle_secs });
        }

        let running = self.worker.is_alive().await;
        tracing::info!(%probe, worker_running = running, "probe failed, recovering");

        match self.perform_recovery(now).await {
            Ok(RecoveryOutcome::Restarted) => Ok(WatchdogReport::Recovered { probe }),
            Ok(RecoveryOutcome::RestartFailed { reason }) => {
                Ok(WatchdogReport::RecoveryFailed { probe, reason })
            }
            Err(crate::error::VigilError::Worker(WorkerError::BudgetExhausted { count, max })) => {
                Ok(WatchdogReport::Escalated { count, max })
            }
            Err(e) => Err(e),
        }
    }

    /// Hard-restart the worker unless the crash budget is spent.
    ///
    /// A restart failure is an `Ok` outcome: it is logged and leaves the
    /// budget incremented.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::BudgetExhausted`] (wrapped) when the budget is
    /// spent, without touching the worker. Returns a state error if the
    /// failure cannot be recorded, also without touching the worker.
    pub async fn perform_recovery(&self, now: DateTime<Utc>) -> Result<RecoveryOutcome> {
        let count = self.crash_budget.read(now);
        let max = self.policy.max_crashes;
        if count >= max {
            let e = WorkerError::BudgetExhausted { count, max };
            self.audit.error(COMPONENT, "escalation", e.to_string());
            return Err(e.into());
        }

        let budget = self.crash_budget.record_failure(now)?;
        self.audit.info(
            COMPONENT,
            "recovery",
            format!("recovery attempt #{} of {max}", budget.count),
        );

        match restart_worker(self.worker.as_ref(), RestartMode::Hard, &self.restart).await {
            Ok(()) => {
                self.liveness.stamp(now)?;
                self.audit.info(COMPONENT, "recovered", "worker restarted");
                Ok(RecoveryOutcome::Restarted)
            }
            Err(e) => {
                self.audit.error(COMPONENT, "recovery_failed", e.to_string());
                Ok(RecoveryOutcome::RestartFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
