//! Shared fakes and fixtures for integration tests.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vigil::command::Instruction;
use vigil::config::RestartConfig;
use vigil::messaging::{Message, Messenger};
use vigil::paths::StatePaths;
use vigil::state::{LockPolicy, StateStore};
use vigil::worker::{Worker, WorkerError, WorkerOutput};

/// Worker that replays scripted `execute` results and counts calls.
///
/// Once the script runs out, `execute` returns `fallback_output`.
pub(crate) struct FakeWorker {
    script: Mutex<VecDeque<Result<WorkerOutput, WorkerError>>>,
    fallback_output: WorkerOutput,
    start_ok: bool,
    delay: Duration,
    pub(crate) executed: Mutex<Vec<Instruction>>,
    pub(crate) stops: AtomicUsize,
    pub(crate) starts: AtomicUsize,
}

impl FakeWorker {
    pub(crate) fn new(script: Vec<Result<WorkerOutput, WorkerError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback_output: ok_output("done"),
            start_ok: true,
            delay: Duration::ZERO,
            executed: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
        }
    }

    /// Worker that answers every instruction with `output`.
    pub(crate) fn always(output: WorkerOutput) -> Self {
        Self {
            fallback_output: output,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn with_failing_start(mut self) -> Self {
        self.start_ok = false;
        self
    }

    /// Make every `execute` take `delay`.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> Vec<Instruction> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for FakeWorker {
    async fn execute(
        &self,
        instruction: &Instruction,
        _timeout: Duration,
    ) -> Result<WorkerOutput, WorkerError> {
        self.executed.lock().unwrap().push(instruction.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback_output.clone()))
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, _timeout: Duration) -> Result<(), WorkerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.start_ok {
            Ok(())
        } else {
            Err(WorkerError::RestartFailed {
                reason: "start script exited 1".to_owned(),
            })
        }
    }

    async fn is_alive(&self) -> bool {
        self.start_ok
    }
}

/// Messenger with a fixed inbox that records sends.
#[derive(Default)]
pub(crate) struct FakeMessenger {
    pub(crate) inbox: Vec<Message>,
    pub(crate) sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn poll_new_messages(&self) -> vigil::Result<Vec<Message>> {
        Ok(self.inbox.clone())
    }

    async fn send_message(&self, recipient_id: &str, text: &str) -> vigil::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_owned(), text.to_owned()));
        Ok(())
    }
}

pub(crate) fn ok_output(stdout: &str) -> WorkerOutput {
    WorkerOutput {
        stdout: stdout.to_owned(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

pub(crate) fn failed_output(stderr: &str) -> WorkerOutput {
    WorkerOutput {
        stdout: String::new(),
        stderr: stderr.to_owned(),
        exit_code: Some(1),
    }
}

/// State store under `dir` with short lock waits.
pub(crate) fn temp_store(dir: &std::path::Path) -> StateStore {
    StateStore::open(
        StatePaths::for_root(dir),
        chrono::TimeDelta::hours(1),
        LockPolicy {
            wait_timeout: Duration::from_millis(200),
            stale_after: Duration::from_secs(600),
        },
    )
}

/// Restart policy without the settle pause.
pub(crate) fn quick_restart() -> RestartConfig {
    RestartConfig {
        settle_secs: 0,
        ..RestartConfig::default()
    }
}

/// Local time in a zone at UTC+3. 2024-01-03 is a Wednesday.
pub(crate) fn local(day: u32, hour: u32, min: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, day, hour, min, 0)
        .unwrap()
}

pub(crate) fn utc(t: DateTime<FixedOffset>) -> DateTime<Utc> {
    t.with_timezone(&Utc)
}
