//! Error types for worker process operations.

/// Errors that can occur while driving the external worker process.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker did not finish within its deadline.
    #[error("worker timed out after {timeout_secs}s")]
    Timeout {
        /// The timeout duration in seconds.
        timeout_secs: u64,
    },

    /// The worker ran but reported failure (non-zero exit).
    #[error("worker failed (exit code: {exit_code:?}): {stderr}")]
    Failed {
        /// The exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// The worker executable could not be spawned.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// The external restart procedure failed or timed out.
    #[error("worker restart failed: {reason}")]
    RestartFailed {
        /// Why the restart failed.
        reason: String,
    },

    /// Unexpected failure while probing worker health.
    #[error("health probe error: {reason}")]
    ProbeError {
        /// What went wrong during the probe.
        reason: String,
    },

    /// Recovery refused because the crash budget is spent.
    #[error(
        "crash budget exhausted ({count}/{max} failures in window), manual intervention required"
    )]
    BudgetExhausted {
        /// Failures recorded in the active window.
        count: u32,
        /// Configured maximum.
        max: u32,
    },
}

impl WorkerError {
    /// Returns `true` for the unresponsive-worker case.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
