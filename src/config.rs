//! Configuration types for the scheduler and supervisor.

use crate::health::{SignalRule, SignalStream, SignalVerdict};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Filesystem locations.
    pub paths: PathsConfig,
    /// Decision engine thresholds.
    pub decision: DecisionConfig,
    /// Worker process invocation.
    pub worker: WorkerConfig,
    /// External restart procedure.
    pub restart: RestartConfig,
    /// Health probe settings.
    pub health: HealthConfig,
    /// Watchdog liveness and crash-budget policy.
    pub watchdog: WatchdogConfig,
    /// Messaging collaborator used by the direct fallback.
    pub messaging: MessagingConfig,
    /// Cross-invocation lock behaviour.
    pub locks: LockConfig,
    /// Audit log retention.
    pub audit: AuditConfig,
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// State directory override. `None` uses [`crate::paths::data_dir`].
    pub data_dir: Option<PathBuf>,
}

/// Decision engine thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Users evaluated by the proactive rule even before any activity is seen.
    pub tracked_users: Vec<String>,
    /// Message polling interval outside night hours.
    pub day_poll_interval_secs: u64,
    /// Message polling interval during night hours.
    pub night_poll_interval_secs: u64,
    /// Minimum gap between two deep-thinking sessions.
    pub deep_thinking_cooldown_secs: u64,
    /// Step budget handed to the worker for deep thinking.
    pub deep_thinking_steps: u32,
    /// Evening silence (minutes) above which evening care is sent.
    pub evening_silence_minutes: u64,
    /// Silence (minutes) above which a casual proactive message is sent.
    pub proactive_silence_minutes: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            tracked_users: Vec::new(),
            day_poll_interval_secs: 300,
            night_poll_interval_secs: 1800,
            deep_thinking_cooldown_secs: 3600,
            deep_thinking_steps: 50,
            evening_silence_minutes: 30,
            proactive_silence_minutes: 90,
        }
    }
}

/// Worker process invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker executable name or path.
    pub program: PathBuf,
    /// Extra arguments passed on every invocation.
    pub args: Vec<String>,
    /// Deadline for one instruction.
    pub timeout_secs: u64,
    /// Extended regex matched against full command lines when force-killing
    /// or checking liveness. `None` derives an anchored pattern from
    /// `program` (see [`WorkerConfig::kill_pattern`]).
    pub process_pattern: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("agent"),
            args: vec!["--no-markdown".to_owned()],
            timeout_secs: 120,
            process_pattern: None,
        }
    }
}

impl WorkerConfig {
    /// Instruction deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pattern handed to `pkill -f` / `pgrep -f`.
    ///
    /// Without an explicit `process_pattern` this matches only command lines
    /// whose first word is the worker program, bare or with a directory:
    /// `agent --no-markdown` and `/usr/bin/agent` match, `ssh-agent` and
    /// `/opt/agent/tool` do not.
    pub fn kill_pattern(&self) -> String {
        if let Some(pattern) = &self.process_pattern {
            return pattern.clone();
        }
        let name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned());
        format!("^([^ ]*/)?{}( |$)", escape_ere(&name))
    }
}

/// External restart procedure (`start --force --quiet`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Restart script.
    pub program: PathBuf,
    /// Arguments for the restart script.
    pub args: Vec<String>,
    /// Working directory for the script. `None` inherits ours.
    pub working_dir: Option<PathBuf>,
    /// Deadline for a soft restart (runner path).
    pub soft_timeout_secs: u64,
    /// Deadline for a hard restart (watchdog path).
    pub hard_timeout_secs: u64,
    /// Pause between force-kill and start.
    pub settle_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("./start"),
            args: vec!["--force".to_owned(), "--quiet".to_owned()],
            working_dir: None,
            soft_timeout_secs: 30,
            hard_timeout_secs: 60,
            settle_secs: 3,
        }
    }
}

/// Health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// No-op instruction sent to the worker.
    pub probe_instruction: String,
    /// Probe deadline.
    pub probe_timeout_secs: u64,
    /// Output signal → classification rules.
    pub signals: Vec<SignalRule>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let alive = ["? for shortcuts", "auto-accept edits on", "health check", "agent>"]
            .into_iter()
            .map(|m| SignalRule::new(m, SignalStream::Stdout, SignalVerdict::Alive));
        let dead = ["command not found", "session expired", "error", "failed"]
            .into_iter()
            .map(|m| SignalRule::new(m, SignalStream::Stderr, SignalVerdict::Dead));
        Self {
            probe_instruction: "echo 'health check'".to_owned(),
            probe_timeout_secs: 10,
            signals: alive.chain(dead).collect(),
        }
    }
}

/// Watchdog liveness and crash-budget policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Idle time without a successful worker interaction before probing.
    pub liveness_threshold_secs: u64,
    /// Failures allowed per window before recovery is refused.
    pub max_crashes: u32,
    /// Window length after which the crash budget resets.
    pub reset_period_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            liveness_threshold_secs: 15 * 60,
            max_crashes: 3,
            reset_period_secs: 3600,
        }
    }
}

/// Messaging collaborator used only by the direct-execution fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Program printing new messages as JSON lines. `None` disables polling.
    pub poll_program: Option<PathBuf>,
    /// Arguments for the poll program.
    pub poll_args: Vec<String>,
    /// Program sending one message (recipient as last arg, text on stdin).
    pub send_program: Option<PathBuf>,
    /// Arguments for the send program, before the recipient.
    pub send_args: Vec<String>,
    /// Deadline for one messaging call.
    pub timeout_secs: u64,
    /// Canned greetings used when the worker cannot compose a message.
    pub greetings: Vec<String>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            poll_program: None,
            poll_args: Vec::new(),
            send_program: None,
            send_args: Vec::new(),
            timeout_secs: 30,
            greetings: vec![
                "Hi! How are you doing? It's been a while since we talked.".to_owned(),
                "Hey, is everything okay? I was thinking about you.".to_owned(),
                "How are things on your side? Anything I can help with?".to_owned(),
            ],
        }
    }
}

/// Cross-invocation lock behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How long an invocation waits for a held lock before giving up.
    pub wait_timeout_ms: u64,
    /// Lock files older than this are considered abandoned.
    pub stale_after_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5_000,
            stale_after_secs: 900,
        }
    }
}

/// Audit log retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Size at which `audit.jsonl` rotates to `audit.jsonl.1`.
    pub max_bytes: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_bytes: crate::audit::DEFAULT_MAX_BYTES,
        }
    }
}

/// Escape POSIX extended-regex metacharacters.
fn escape_ere(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '.' | '[' | ']' | '(' | ')' | '{' | '}' | '*' | '+' | '?' | '^' | '$' | '|' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl VigilConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VigilError::Config(e.to_string()))
    }

    /// Load `path` if given, else the default config file when it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly requested file is missing, or any
    /// existing file cannot be parsed.
    pub fn load(path: Option<&Path>) -> crate::error::Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default_path = Self::default_config_path();
        if default_path.is_file() {
            Self::from_file(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VigilError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::paths::config_file()
    }

    /// State directory in effect for this config.
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(crate::paths::data_dir)
    }
}
