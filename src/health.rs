//! Worker health probing.
//!
//! A probe sends a no-op instruction and classifies the output against a
//! configurable signal table: any alive marker on its stream and no dead
//! marker on its stream means healthy. Markers match case-insensitively as
//! substrings. The result is persisted as the current [`HealthRecord`],
//! replacing the previous one.
//!
//! [`HealthRecord`]: crate::state::HealthRecord

use crate::audit::AuditLog;
use crate::command::Instruction;
use crate::config::{HealthConfig, RestartConfig};
use crate::state::{HealthRecordStore, HealthStatus};
use crate::worker::{RestartMode, Worker, WorkerError, restart_worker};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const COMPONENT: &str = "health";

/// Output stream a marker is searched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStream {
    Stdout,
    Stderr,
}

/// What a matched marker says about the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalVerdict {
    Alive,
    Dead,
}

/// One `{marker → verdict}` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRule {
    pub marker: String,
    pub stream: SignalStream,
    pub verdict: SignalVerdict,
}

impl SignalRule {
    pub fn new(marker: &str, stream: SignalStream, verdict: SignalVerdict) -> Self {
        Self {
            marker: marker.to_owned(),
            stream,
            verdict,
        }
    }
}

/// Classifier over a set of [`SignalRule`]s.
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    rules: Vec<SignalRule>,
}

impl SignalTable {
    pub fn new(rules: Vec<SignalRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| SignalRule {
                marker: r.marker.to_lowercase(),
                ..r
            })
            .collect();
        Self { rules }
    }

    /// `Healthy` iff some alive rule matches and no dead rule matches.
    pub fn classify(&self, stdout: &str, stderr: &str) -> HealthStatus {
        let stdout = stdout.to_lowercase();
        let stderr = stderr.to_lowercase();
        let matches = |verdict: SignalVerdict| {
            self.rules.iter().filter(|r| r.verdict == verdict).any(|r| {
                let haystack = match r.stream {
                    SignalStream::Stdout => &stdout,
                    SignalStream::Stderr => &stderr,
                };
                haystack.contains(&r.marker)
            })
        };

        if matches(SignalVerdict::Alive) && !matches(SignalVerdict::Dead) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// Probes the worker and keeps the health record current.
pub struct HealthMonitor {
    worker: Arc<dyn Worker>,
    table: SignalTable,
    probe_instruction: Instruction,
    probe_timeout: Duration,
    restart: RestartConfig,
    store: HealthRecordStore,
    audit: AuditLog,
}

impl HealthMonitor {
    pub fn new(
        worker: Arc<dyn Worker>,
        config: &HealthConfig,
        restart: RestartConfig,
        store: HealthRecordStore,
        audit: AuditLog,
    ) -> Self {
        Self {
            worker,
            table: SignalTable::new(config.signals.clone()),
            probe_instruction: Instruction::probe(config.probe_instruction.clone()),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            restart,
            store,
            audit,
        }
    }

    /// Probe once and persist the result.
    pub async fn probe(&self) -> HealthStatus {
        let status = match self
            .worker
            .execute(&self.probe_instruction, self.probe_timeout)
            .await
        {
            Ok(output) => {
                let status = self.table.classify(&output.stdout, &output.stderr);
                if status.is_healthy() {
                    self.audit.info(COMPONENT, "probe", "worker is healthy");
                } else {
                    self.audit.warn(
                        COMPONENT,
                        "probe",
                        format!(
                            "worker is unhealthy (exit {:?}, stderr: {})",
                            output.exit_code,
                            output.stderr.trim()
                        ),
                    );
                }
                status
            }
            Err(e) if e.is_timeout() => {
                self.audit
                    .error(COMPONENT, "probe_timeout", format!("health probe {e}"));
                HealthStatus::Timeout
            }
            Err(e) => {
                let e = WorkerError::ProbeError {
                    reason: e.to_string(),
                };
                self.audit.error(COMPONENT, "probe_error", e.to_string());
                HealthStatus::Error
            }
        };

        self.persist(status);
        status
    }

    /// Probe and, if the worker is not healthy, soft-restart it.
    ///
    /// Returns the final status: the probe result when healthy, otherwise
    /// `Restarted`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::RestartFailed`] when the restart fails. The
    /// probe's status stays recorded in that case.
    pub async fn restart_if_needed(&self) -> Result<HealthStatus, WorkerError> {
        let status = self.probe().await;
        if status.is_healthy() {
            return Ok(status);
        }

        self.audit.warn(
            COMPONENT,
            "restart",
            format!("worker {status}, attempting restart"),
        );
        match restart_worker(self.worker.as_ref(), RestartMode::Soft, &self.restart).await {
            Ok(()) => {
                self.audit.info(COMPONENT, "restarted", "worker restarted");
                self.persist(HealthStatus::Restarted);
                Ok(HealthStatus::Restarted)
            }
            Err(e) => {
                self.audit.error(COMPONENT, "restart_failed", e.to_string());
                Err(e)
            }
        }
    }

    fn persist(&self, status: HealthStatus) {
        if let Err(e) = self.store.save(status, Utc::now()) {
            tracing::error!(%status, "failed to persist health record: {e}");
        }
    }
}
