//! Persistent state store.
//!
//! Each document is owned by one component and read-modify-written as a
//! whole. [`StateStore`] bundles the stores for one state directory so the
//! binary can hand each component the piece it owns.

pub mod crash_budget;
pub mod document;
pub mod health_record;
pub mod liveness;
pub mod lock;
pub mod orchestrator;

pub use crash_budget::{CrashBudget, CrashBudgetStore};
pub use document::JsonDocument;
pub use health_record::{HealthRecord, HealthRecordStore, HealthStatus};
pub use liveness::{LivenessRecord, LivenessStore};
pub use lock::{FileLockGuard, LockPolicy};
pub use orchestrator::{OrchestratorState, OrchestratorStateStore};

use crate::paths::StatePaths;
use chrono::TimeDelta;

/// All document stores under one state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    pub paths: StatePaths,
    pub orchestrator: OrchestratorStateStore,
    pub crash_budget: CrashBudgetStore,
    pub health: HealthRecordStore,
    pub liveness: LivenessStore,
    pub lock_policy: LockPolicy,
}

impl StateStore {
    /// Open the stores under `paths`.
    pub fn open(paths: StatePaths, crash_reset_period: TimeDelta, lock_policy: LockPolicy) -> Self {
        Self {
            orchestrator: OrchestratorStateStore::new(&paths.orchestrator_state()),
            crash_budget: CrashBudgetStore::new(&paths.crash_budget(), crash_reset_period),
            health: HealthRecordStore::new(&paths.health()),
            liveness: LivenessStore::new(&paths.liveness()),
            lock_policy,
            paths,
        }
    }

    /// Open the stores described by `config`.
    pub fn from_config(config: &crate::config::VigilConfig) -> Self {
        Self::open(
            StatePaths::for_root(config.data_dir()),
            crate::clock::delta_secs(config.watchdog.reset_period_secs),
            LockPolicy::from_config(&config.locks),
        )
    }

    /// Take the lock guarding the orchestrator state document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::VigilError::Lock`] if another invocation
    /// holds it past the wait timeout.
    pub async fn lock_state(&self) -> crate::error::Result<FileLockGuard> {
        lock::acquire(&self.paths.state_lock(), self.lock_policy).await
    }

    /// Take the lock guarding the worker process.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::VigilError::Lock`] if another invocation
    /// holds it past the wait timeout.
    pub async fn lock_worker(&self) -> crate::error::Result<FileLockGuard> {
        lock::acquire(&self.paths.worker_lock(), self.lock_policy).await
    }
}
