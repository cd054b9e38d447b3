//! Command runner: executes one instruction through an ordered pipeline.
//!
//! ```text
//! primary ──ok──────────────────────────────▶ done
//!    │ failed            │ timed out
//!    ▼                   │
//! soft restart ──fail──┐ │
//!    │ ok              │ │
//!    ▼                 ▼ ▼
//! retry ──fail──▶ direct fallback ─────────▶ done
//! ```
//!
//! An unresponsive worker goes straight to the fallback without a restart.
//! While the crash budget is spent the restart is skipped as well, so a
//! failing worker is never restarted in a loop. Every stage is audited.

use crate::audit::AuditLog;
use crate::command::{Instruction, InstructionKind};
use crate::config::RestartConfig;
use crate::messaging::{Message, Messenger};
use crate::state::CrashBudgetStore;
use crate::worker::{RestartMode, Worker, WorkerError, WorkerOutput, restart_worker};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const COMPONENT: &str = "runner";

/// Pipeline stage that produced the final outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Primary,
    Retry,
    DirectFallback,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Primary => "primary",
            Self::Retry => "retry",
            Self::DirectFallback => "direct_fallback",
        };
        f.write_str(label)
    }
}

/// Final result of running one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stage: ExecutionStage,
    pub detail: String,
    /// Messages observed by the fallback poll.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

impl ExecutionOutcome {
    fn new(success: bool, stage: ExecutionStage, detail: impl Into<String>) -> Self {
        Self {
            success,
            stage,
            detail: detail.into(),
            messages: Vec::new(),
        }
    }

    /// `true` when the worker itself carried out the instruction.
    pub fn worker_succeeded(&self) -> bool {
        self.success && self.stage != ExecutionStage::DirectFallback
    }
}

/// Crash budget the runner consults before restarting the worker.
#[derive(Debug, Clone)]
struct RestartBudget {
    store: CrashBudgetStore,
    max_crashes: u32,
}

/// Runs instructions against the worker with restart, retry and fallback.
pub struct CommandRunner {
    worker: Arc<dyn Worker>,
    messenger: Arc<dyn Messenger>,
    timeout: Duration,
    restart: RestartConfig,
    greetings: Vec<String>,
    budget: Option<RestartBudget>,
    audit: AuditLog,
}

impl CommandRunner {
    pub fn new(
        worker: Arc<dyn Worker>,
        messenger: Arc<dyn Messenger>,
        timeout: Duration,
        restart: RestartConfig,
        greetings: Vec<String>,
        audit: AuditLog,
    ) -> Self {
        Self {
            worker,
            messenger,
            timeout,
            restart,
            greetings,
            budget: None,
            audit,
        }
    }

    /// Skip the restart stage while `store` holds `max_crashes` or more
    /// failures in its current window.
    #[must_use]
    pub fn with_crash_budget(mut self, store: CrashBudgetStore, max_crashes: u32) -> Self {
        self.budget = Some(RestartBudget { store, max_crashes });
        self
    }

    /// Run `instruction` through the pipeline. `now` is used for the crash
    /// budget window. Never fails: every error ends in an outcome with
    /// `success == false`.
    pub async fn execute(&self, instruction: &Instruction, now: DateTime<Utc>) -> ExecutionOutcome {
        let primary = match self.attempt(instruction, ExecutionStage::Primary).await {
            Ok(output) => return self.succeeded(ExecutionStage::Primary, &output),
            Err(e) => e,
        };

        if primary.is_timeout() {
            return self.direct_fallback(instruction).await;
        }

        if let Some(spent) = self.spent_budget(now) {
            self.audit.error(
                COMPONENT,
                "restart_skipped",
                format!("not restarting worker: {spent}"),
            );
            return self.direct_fallback(instruction).await;
        }

        if let Err(e) =
            restart_worker(self.worker.as_ref(), RestartMode::Soft, &self.restart).await
        {
            self.audit.error(COMPONENT, "restart_failed", e.to_string());
            return self.direct_fallback(instruction).await;
        }
        self.audit.info(COMPONENT, "restarted", "worker restarted, retrying");

        match self.attempt(instruction, ExecutionStage::Retry).await {
            Ok(output) => self.succeeded(ExecutionStage::Retry, &output),
            Err(_) => self.direct_fallback(instruction).await,
        }
    }

    fn spent_budget(&self, now: DateTime<Utc>) -> Option<WorkerError> {
        let budget = self.budget.as_ref()?;
        let count = budget.store.read(now);
        (count >= budget.max_crashes).then_some(WorkerError::BudgetExhausted {
            count,
            max: budget.max_crashes,
        })
    }

    async fn attempt(
        &self,
        instruction: &Instruction,
        stage: ExecutionStage,
    ) -> Result<WorkerOutput, WorkerError> {
        let result = self
            .worker
            .execute(instruction, self.timeout)
            .await
            .and_then(WorkerOutput::into_result);
        if let Err(e) = &result {
            let event = if e.is_timeout() { "timeout" } else { "failed" };
            self.audit
                .error(COMPONENT, event, format!("{stage} attempt: {e}"));
        }
        result
    }

    fn succeeded(&self, stage: ExecutionStage, output: &WorkerOutput) -> ExecutionOutcome {
        let detail = format!("{stage} attempt succeeded");
        self.audit.info(COMPONENT, "succeeded", detail.clone());
        tracing::debug!(stdout = %output.stdout.trim(), "worker output");
        ExecutionOutcome::new(true, stage, detail)
    }

    /// Carry out what can be done without the worker.
    async fn direct_fallback(&self, instruction: &Instruction) -> ExecutionOutcome {
        self.audit.warn(
            COMPONENT,
            "fallback",
            format!("executing {:?} directly without the worker", instruction.kind),
        );

        let outcome = match instruction.kind {
            InstructionKind::CheckMessages => self.fallback_poll().await,
            InstructionKind::ProactiveMessage | InstructionKind::ProactiveCare => {
                self.fallback_greeting(instruction.recipient.as_deref()).await
            }
            other => ExecutionOutcome::new(
                false,
                ExecutionStage::DirectFallback,
                format!("no direct handler for {other:?}"),
            ),
        };

        if outcome.success {
            self.audit.info(COMPONENT, "fallback_succeeded", outcome.detail.clone());
        } else {
            self.audit.error(COMPONENT, "fallback_failed", outcome.detail.clone());
        }
        outcome
    }

    async fn fallback_poll(&self) -> ExecutionOutcome {
        match self.messenger.poll_new_messages().await {
            Ok(messages) => {
                let detail = if messages.is_empty() {
                    "no new messages".to_owned()
                } else {
                    format!("found {} new messages", messages.len())
                };
                ExecutionOutcome {
                    messages,
                    ..ExecutionOutcome::new(true, ExecutionStage::DirectFallback, detail)
                }
            }
            Err(e) => ExecutionOutcome::new(false, ExecutionStage::DirectFallback, e.to_string()),
        }
    }

    async fn fallback_greeting(&self, recipient: Option<&str>) -> ExecutionOutcome {
        let Some(recipient) = recipient else {
            return ExecutionOutcome::new(
                false,
                ExecutionStage::DirectFallback,
                "proactive instruction has no recipient",
            );
        };
        let Some(greeting) = self.pick_greeting() else {
            return ExecutionOutcome::new(
                false,
                ExecutionStage::DirectFallback,
                "no canned greetings configured",
            );
        };

        match self.messenger.send_message(recipient, greeting).await {
            Ok(()) => ExecutionOutcome::new(
                true,
                ExecutionStage::DirectFallback,
                format!("sent canned greeting to {recipient}"),
            ),
            Err(e) => ExecutionOutcome::new(false, ExecutionStage::DirectFallback, e.to_string()),
        }
    }

    fn pick_greeting(&self) -> Option<&str> {
        self.greetings
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}
