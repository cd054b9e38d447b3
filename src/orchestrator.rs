//! One scheduler tick: read state, decide, build, execute, persist.

use crate::audit::AuditLog;
use crate::clock;
use crate::command;
use crate::decision::{Action, ActionKind, DecisionEngine};
use crate::error::Result;
use crate::runner::{CommandRunner, ExecutionOutcome};
use crate::state::{OrchestratorState, StateStore};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::time::Instant;

const COMPONENT: &str = "orchestrator";

/// Result of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub action: Action,
    pub outcome: ExecutionOutcome,
}

/// Stamp `state` for an executed action.
///
/// Applied whatever the execution outcome.
pub fn apply_action(state: &mut OrchestratorState, kind: &ActionKind, at: DateTime<Utc>) {
    match kind {
        ActionKind::CheckMessages => state.last_message_check = Some(at),
        ActionKind::DeepThinking { .. } => state.last_deep_thinking = Some(at),
        ActionKind::ProactiveMessage { .. } | ActionKind::ProactiveCare { .. } => {
            state.last_proactive_message = Some(at);
        }
        ActionKind::BackgroundTask { .. } => {
            state.background_tasks_completed = state.background_tasks_completed.saturating_add(1);
        }
        ActionKind::MemoryCleanup => {}
    }
}

/// Load the orchestrator state with clock-skewed timestamps removed.
fn load_state(store: &StateStore, now: DateTime<Utc>, audit: &AuditLog) -> OrchestratorState {
    let mut state = store.orchestrator.load();
    let dropped = state.discard_future(now);
    if dropped > 0 {
        audit.warn(
            COMPONENT,
            "clock_skew",
            format!("discarded {dropped} timestamps later than now"),
        );
    }
    state
}

/// Record user activity observed outside a tick.
///
/// # Errors
///
/// Returns an error if the state lock cannot be taken or the state cannot
/// be saved.
pub async fn record_user_activity(
    store: &StateStore,
    audit: &AuditLog,
    user_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let _state_lock = store.lock_state().await?;
    let mut state = load_state(store, at, audit);
    state.record_user_activity(user_id, at);
    store.orchestrator.save(&state)?;
    audit.info(COMPONENT, "user_activity", format!("{user_id} active at {at}"));
    Ok(())
}

/// Drives decision, execution and state persistence.
pub struct Orchestrator {
    engine: DecisionEngine,
    store: StateStore,
    runner: CommandRunner,
    audit: AuditLog,
}

impl Orchestrator {
    pub fn new(
        engine: DecisionEngine,
        store: StateStore,
        runner: CommandRunner,
        audit: AuditLog,
    ) -> Self {
        Self {
            engine,
            store,
            runner,
            audit,
        }
    }

    /// The action a tick at `now` would take. Reads state without locking
    /// and changes nothing.
    pub fn preview(&self, now: DateTime<FixedOffset>) -> Action {
        let mut state = self.store.orchestrator.load();
        state.discard_future(now.with_timezone(&Utc));
        self.engine.decide(&state, now)
    }

    /// Run one tick.
    ///
    /// Holds the state lock, then the worker lock, for the whole tick. The
    /// action is stamped at `now` plus the time execution took, in whole
    /// seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock cannot be taken or the state cannot be
    /// saved. Worker failures are not errors; they end in the outcome.
    pub async fn tick(&self, now: DateTime<FixedOffset>) -> Result<TickReport> {
        let _state_lock = self.store.lock_state().await?;
        let _worker_lock = self.store.lock_worker().await?;

        let now_utc = now.with_timezone(&Utc);
        let mut state = load_state(&self.store, now_utc, &self.audit);

        let action = self.engine.decide(&state, now);
        self.audit.info(
            COMPONENT,
            "decision",
            format!("{}: {}", action.kind, action.reason),
        );

        let instruction = command::build(&action);
        let started = Instant::now();
        let outcome = self.runner.execute(&instruction, now_utc).await;
        let finished_at = now_utc
            .checked_add_signed(clock::delta_secs(started.elapsed().as_secs()))
            .unwrap_or(now_utc);

        apply_action(&mut state, &action.kind, finished_at);
        for message in &outcome.messages {
            if message.timestamp <= finished_at {
                state.record_user_activity(&message.sender, message.timestamp);
            }
        }
        self.store.orchestrator.save(&state)?;

        if outcome.worker_succeeded()
            && let Err(e) = self.store.liveness.stamp(finished_at)
        {
            tracing::error!("failed to stamp liveness: {e}");
        }

        let detail = format!("{} via {}: {}", action.kind, outcome.stage, outcome.detail);
        if outcome.success {
            self.audit.info(COMPONENT, "tick_complete", detail);
        } else {
            self.audit.error(COMPONENT, "tick_failed", detail);
        }

        Ok(TickReport { action, outcome })
    }
}
