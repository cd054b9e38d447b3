//! Messaging collaborator used by the direct-execution fallback.
//!
//! When the worker cannot run an instruction, the runner talks to the chat
//! transport itself through [`Messenger`]. [`ExternalMessenger`] drives two
//! configured programs: one prints new messages as JSON lines, the other
//! sends one message (recipient as last argument, text on stdin).

use crate::config::MessagingConfig;
use crate::error::{Result, VigilError};
use crate::worker::process::run_with_input;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;

/// An incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Messages received since the last poll.
    async fn poll_new_messages(&self) -> Result<Vec<Message>>;

    /// Send `text` to `recipient_id`.
    async fn send_message(&self, recipient_id: &str, text: &str) -> Result<()>;
}

/// [`Messenger`] backed by external programs.
#[derive(Debug, Clone)]
pub struct ExternalMessenger {
    config: MessagingConfig,
}

impl ExternalMessenger {
    pub fn new(config: MessagingConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

#[async_trait]
impl Messenger for ExternalMessenger {
    async fn poll_new_messages(&self) -> Result<Vec<Message>> {
        let program = self
            .config
            .poll_program
            .as_ref()
            .ok_or_else(|| VigilError::Messaging("no poll program configured".to_owned()))?;

        let mut command = Command::new(program);
        command.args(&self.config.poll_args);
        let output = run_with_input(command, None, self.timeout())
            .await
            .and_then(|o| o.into_result())
            .map_err(|e| VigilError::Messaging(format!("poll failed: {e}")))?;

        Ok(parse_messages(&output.stdout))
    }

    async fn send_message(&self, recipient_id: &str, text: &str) -> Result<()> {
        let program = self
            .config
            .send_program
            .as_ref()
            .ok_or_else(|| VigilError::Messaging("no send program configured".to_owned()))?;

        let mut command = Command::new(program);
        command.args(&self.config.send_args).arg(recipient_id);
        run_with_input(command, Some(text), self.timeout())
            .await
            .and_then(|o| o.into_result())
            .map_err(|e| VigilError::Messaging(format!("send to {recipient_id} failed: {e}")))?;
        Ok(())
    }
}

/// Parse JSON-lines output, skipping blank and malformed lines.
pub fn parse_messages(stdout: &str) -> Vec<Message> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Message>(line) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed message line");
                None
            }
        })
        .collect()
}
