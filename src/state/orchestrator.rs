//! Decision engine state.

use super::document::JsonDocument;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Interaction history the decision engine reasons over.
///
/// Loaded once at the start of an invocation and written once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorState {
    /// Last time new messages were polled.
    pub last_message_check: Option<DateTime<Utc>>,
    /// Last time a proactive message was sent to anyone.
    pub last_proactive_message: Option<DateTime<Utc>>,
    /// Last deep-thinking session.
    pub last_deep_thinking: Option<DateTime<Utc>>,
    /// Background tasks run so far. Only ever increases.
    pub background_tasks_completed: u64,
    /// Last observed activity per user.
    pub users_silence_time: BTreeMap<String, DateTime<Utc>>,
}

impl OrchestratorState {
    /// Record that `user_id` was active at `at`. Older observations never
    /// overwrite newer ones.
    pub fn record_user_activity(&mut self, user_id: &str, at: DateTime<Utc>) {
        match self.users_silence_time.get_mut(user_id) {
            Some(existing) if *existing >= at => {}
            Some(existing) => *existing = at,
            None => {
                self.users_silence_time.insert(user_id.to_owned(), at);
            }
        }
    }

    /// Seconds since `user_id` was last active. Unknown users count as not
    /// silent (0).
    pub fn silence_secs(&self, user_id: &str, now: DateTime<Utc>) -> u64 {
        self.users_silence_time
            .get(user_id)
            .map(|last| u64::try_from((now - *last).num_seconds()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Drop every timestamp later than `now`. Returns how many were dropped.
    pub fn discard_future(&mut self, now: DateTime<Utc>) -> usize {
        let mut dropped = 0;
        for slot in [
            &mut self.last_message_check,
            &mut self.last_proactive_message,
            &mut self.last_deep_thinking,
        ] {
            if slot.is_some_and(|t| t > now) {
                *slot = None;
                dropped += 1;
            }
        }
        let before = self.users_silence_time.len();
        self.users_silence_time.retain(|_, t| *t <= now);
        dropped + (before - self.users_silence_time.len())
    }
}

/// Persistence for [`OrchestratorState`].
#[derive(Debug, Clone)]
pub struct OrchestratorStateStore {
    doc: JsonDocument<OrchestratorState>,
}

impl OrchestratorStateStore {
    /// Store backed by the document at `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            doc: JsonDocument::new(path, "orchestrator state"),
        }
    }

    /// Load the state, starting fresh when the document is missing or
    /// unreadable.
    pub fn load(&self) -> OrchestratorState {
        match self.doc.load() {
            Ok(Some(state)) => state,
            Ok(None) => OrchestratorState::default(),
            Err(e) => {
                tracing::error!("{e}; starting from empty state");
                OrchestratorState::default()
            }
        }
    }

    /// Persist `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save(&self, state: &OrchestratorState) -> Result<()> {
        self.doc.save(state)
    }

    /// Document path.
    pub fn path(&self) -> &Path {
        self.doc.path()
    }
}
