//! [`Worker`] backed by real child processes.

use super::{Worker, WorkerError, WorkerOutput};
use crate::command::Instruction;
use crate::config::{RestartConfig, WorkerConfig};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Run `command` to completion, feeding `input` on stdin, within `timeout`.
///
/// The child is killed if the deadline passes.
pub(crate) async fn run_with_input(
    mut command: Command,
    input: Option<&str>,
    timeout: Duration,
) -> Result<WorkerOutput, WorkerError> {
    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(WorkerError::SpawnFailed)?;
    let stdin = child.stdin.take();
    let input = input.map(str::to_owned);

    let run = async move {
        if let (Some(mut stdin), Some(text)) = (stdin, input) {
            match stdin.write_all(text.as_bytes()).await {
                Ok(()) => {}
                // The child may exit without reading its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e),
            }
            drop(stdin);
        }
        child.wait_with_output().await
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(output)) => Ok(WorkerOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        }),
        Ok(Err(e)) => Err(WorkerError::SpawnFailed(e)),
        Err(_) => Err(WorkerError::Timeout {
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Drives the configured worker executable and restart script.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    worker: WorkerConfig,
    restart: RestartConfig,
}

impl ProcessWorker {
    pub fn new(worker: WorkerConfig, restart: RestartConfig) -> Self {
        Self { worker, restart }
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn execute(
        &self,
        instruction: &Instruction,
        timeout: Duration,
    ) -> Result<WorkerOutput, WorkerError> {
        let mut command = Command::new(&self.worker.program);
        command.args(&self.worker.args);
        tracing::debug!(
            program = %self.worker.program.display(),
            kind = ?instruction.kind,
            timeout_secs = timeout.as_secs(),
            "sending instruction to worker"
        );
        run_with_input(command, Some(&instruction.text), timeout).await
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        let pattern = self.worker.kill_pattern();
        let mut command = Command::new("pkill");
        command.args(["-9", "-f", pattern.as_str()]);
        let output = run_with_input(command, None, Duration::from_secs(10))
            .await
            .map_err(|e| WorkerError::RestartFailed {
                reason: format!("pkill: {e}"),
            })?;
        // pkill exits 1 when nothing matched.
        match output.exit_code {
            Some(0 | 1) => Ok(()),
            code => Err(WorkerError::RestartFailed {
                reason: format!("pkill exited with {code:?}: {}", output.stderr.trim()),
            }),
        }
    }

    async fn start(&self, timeout: Duration) -> Result<(), WorkerError> {
        let mut command = Command::new(&self.restart.program);
        command.args(&self.restart.args);
        if let Some(dir) = &self.restart.working_dir {
            command.current_dir(dir);
        }

        let output = run_with_input(command, None, timeout)
            .await
            .map_err(|e| WorkerError::RestartFailed {
                reason: e.to_string(),
            })?;
        if output.success() {
            Ok(())
        } else {
            let stderr = output.stderr.trim();
            Err(WorkerError::RestartFailed {
                reason: if stderr.is_empty() {
                    format!("start procedure exited with {:?}", output.exit_code)
                } else {
                    stderr.to_owned()
                },
            })
        }
    }

    async fn is_alive(&self) -> bool {
        let pattern = self.worker.kill_pattern();
        let mut command = Command::new("pgrep");
        command.args(["-f", pattern.as_str()]);
        match run_with_input(command, None, Duration::from_secs(10)).await {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::warn!("pgrep failed: {e}");
                false
            }
        }
    }
}
