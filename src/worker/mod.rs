//! Worker process handle and the shared restart primitive.
//!
//! The worker is an external executable that takes one textual instruction
//! on stdin and reports on stdout/stderr. [`Worker`] is the seam between
//! that process and the runner and supervisor, so both can be tested with a
//! scripted implementation.
//!
//! [`restart_worker`] is the only place the worker is stopped and started.
//! The runner uses [`RestartMode::Soft`]; the watchdog's recovery path uses
//! [`RestartMode::Hard`].

pub mod error;
pub mod process;

pub use error::WorkerError;
pub use process::ProcessWorker;

use crate::command::Instruction;
use crate::config::RestartConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Captured result of one worker invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl WorkerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convert a non-zero exit into [`WorkerError::Failed`].
    pub fn into_result(self) -> Result<Self, WorkerError> {
        if self.success() {
            Ok(self)
        } else {
            Err(WorkerError::Failed {
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_owned(),
            })
        }
    }
}

/// Managed handle to the worker process.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run one instruction. Any exit status is `Ok`; only an unresponsive or
    /// unspawnable worker is an error.
    async fn execute(
        &self,
        instruction: &Instruction,
        timeout: Duration,
    ) -> Result<WorkerOutput, WorkerError>;

    /// Force-terminate any running worker.
    async fn stop(&self) -> Result<(), WorkerError>;

    /// Run the external start procedure. Its exit status is the only signal.
    async fn start(&self, timeout: Duration) -> Result<(), WorkerError>;

    /// Whether a worker process is currently running.
    async fn is_alive(&self) -> bool;
}

/// Restart strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    /// Start procedure only, short deadline.
    Soft,
    /// Force-kill, settle, then start with the long deadline.
    Hard,
}

impl std::fmt::Display for RestartMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Soft => f.write_str("soft"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

/// Stop and start the worker.
///
/// A failed force-kill is logged and does not abort a hard restart; the
/// start procedure's result decides the outcome.
///
/// # Errors
///
/// Returns [`WorkerError::RestartFailed`] if the start procedure fails or
/// times out.
pub async fn restart_worker(
    worker: &dyn Worker,
    mode: RestartMode,
    config: &RestartConfig,
) -> Result<(), WorkerError> {
    tracing::info!(%mode, "restarting worker");

    let timeout = match mode {
        RestartMode::Soft => Duration::from_secs(config.soft_timeout_secs),
        RestartMode::Hard => {
            if let Err(e) = worker.stop().await {
                tracing::warn!("force-kill before restart failed: {e}");
            }
            tokio::time::sleep(Duration::from_secs(config.settle_secs)).await;
            Duration::from_secs(config.hard_timeout_secs)
        }
    };

    match worker.start(timeout).await {
        Ok(()) => {
            tracing::info!(%mode, "worker restarted");
            Ok(())
        }
        Err(e) => {
            tracing::error!(%mode, "worker restart failed: {e}");
            Err(match e {
                WorkerError::RestartFailed { .. } => e,
                other => WorkerError::RestartFailed {
                    reason: other.to_string(),
                },
            })
        }
    }
}
