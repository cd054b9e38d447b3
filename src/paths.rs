//! Centralized filesystem paths.
//!
//! Default roots come from the [`dirs`] crate. Every persisted document lives
//! under one state directory so tests and deployments can relocate the whole
//! set at once.
//!
//! # Directory Layout
//!
//! ```text
//! <data_dir>/
//!   orchestrator_state.json   ← decision engine state
//!   crash_budget.json         ← watchdog failure window
//!   health.json               ← last health probe
//!   liveness.json             ← last successful worker interaction
//!   audit.jsonl               ← append-only audit trail
//!   orchestrator.lock         ← held while a tick reads/writes state
//!   worker.lock               ← held while anything talks to the worker
//!   logs/                     ← rolling diagnostic logs
//! ```
//!
//! # Environment Overrides
//!
//! - `VIGIL_DATA_DIR`: overrides [`data_dir`]
//! - `VIGIL_CONFIG_DIR`: overrides [`config_dir`]

use std::path::{Path, PathBuf};

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/vigil/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("VIGIL_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("vigil"))
        .unwrap_or_else(|| PathBuf::from("/tmp/vigil-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/vigil/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("VIGIL_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("vigil"))
        .unwrap_or_else(|| PathBuf::from("/tmp/vigil-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Paths of every persisted document under one state root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    /// State root directory.
    pub root: PathBuf,
}

impl StatePaths {
    /// Lay out documents under `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// State root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decision engine state document.
    pub fn orchestrator_state(&self) -> PathBuf {
        self.root.join("orchestrator_state.json")
    }

    /// Crash budget document.
    pub fn crash_budget(&self) -> PathBuf {
        self.root.join("crash_budget.json")
    }

    /// Health record document.
    pub fn health(&self) -> PathBuf {
        self.root.join("health.json")
    }

    /// Last-successful-operation document.
    pub fn liveness(&self) -> PathBuf {
        self.root.join("liveness.json")
    }

    /// Audit log (JSONL).
    pub fn audit_log(&self) -> PathBuf {
        self.root.join("audit.jsonl")
    }

    /// Lock guarding the orchestrator state document.
    pub fn state_lock(&self) -> PathBuf {
        self.root.join("orchestrator.lock")
    }

    /// Lock guarding the worker process.
    pub fn worker_lock(&self) -> PathBuf {
        self.root.join("worker.lock")
    }

    /// Rolling diagnostic log directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
