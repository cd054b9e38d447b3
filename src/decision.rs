//! Decision engine: one next action per invocation.
//!
//! Rules are evaluated in priority order and the first match wins:
//!
//! 1. Night (01:00–06:59): deep-thinking reflection, or light memory cleanup
//!    when the last session was under the cooldown ago.
//! 2. Message polling when the poll interval has elapsed or no poll has
//!    ever happened.
//! 3. Proactive outreach to a silent user (evening care or a casual check).
//!    Never at night.
//! 4. Background task rotation.
//!
//! [`DecisionEngine::decide`] is pure: the same state and time always yield
//! the same action.

use crate::clock::{self, DayPart};
use crate::config::DecisionConfig;
use crate::state::OrchestratorState;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nightly reflection topics, indexed by weekday (Monday first).
pub const REFLECTION_TOPICS: [&str; 7] = [
    "What did I learn about people today?",
    "Which behaviour patterns did I notice?",
    "How can I become more helpful?",
    "What surprised me in conversation?",
    "Which questions remained unanswered?",
    "How is my understanding of empathy developing?",
    "What makes a conversation feel alive?",
];

/// Topics offered for evening care.
pub const EVENING_SUPPORT_TOPICS: [&str; 2] = ["quitting smoking", "how the day went"];

/// Background task rotation order.
pub const BACKGROUND_ROTATION: [BackgroundKind; 4] = [
    BackgroundKind::AnalyzePatterns,
    BackgroundKind::ResearchInterests,
    BackgroundKind::UpdatePortrait,
    BackgroundKind::PrepareContent,
];

/// Background maintenance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundKind {
    AnalyzePatterns,
    ResearchInterests,
    UpdatePortrait,
    PrepareContent,
}

impl BackgroundKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzePatterns => "analyze_patterns",
            Self::ResearchInterests => "research_interests",
            Self::UpdatePortrait => "update_portrait",
            Self::PrepareContent => "prepare_content",
        }
    }

    /// Human-readable description used as the action reason.
    pub fn description(self) -> &'static str {
        match self {
            Self::AnalyzePatterns => "Analyse communication patterns",
            Self::ResearchInterests => "Research user interests",
            Self::UpdatePortrait => "Update personality portraits",
            Self::PrepareContent => "Prepare interesting content",
        }
    }
}

impl fmt::Display for BackgroundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tone of a proactive message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProactiveStyle {
    CasualCheck,
}

/// What to do this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// Poll for and answer new messages.
    CheckMessages,
    /// Long reflection session.
    DeepThinking { topic: String, steps: u32 },
    /// Reach out to a user who has been silent.
    ProactiveMessage {
        user_id: String,
        style: ProactiveStyle,
    },
    /// Gentle evening check-in.
    ProactiveCare {
        user_id: String,
        topics: Vec<String>,
    },
    /// One step of the background rotation.
    BackgroundTask { kind: BackgroundKind },
    /// Light housekeeping.
    MemoryCleanup,
}

impl ActionKind {
    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckMessages => "check_messages",
            Self::DeepThinking { .. } => "deep_thinking",
            Self::ProactiveMessage { .. } => "proactive_message",
            Self::ProactiveCare { .. } => "proactive_care",
            Self::BackgroundTask { kind } => kind.as_str(),
            Self::MemoryCleanup => "memory_cleanup",
        }
    }

    /// Recipient, for actions addressed to a user.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::ProactiveMessage { user_id, .. } | Self::ProactiveCare { user_id, .. } => {
                Some(user_id)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decided action and why it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub reason: String,
}

impl Action {
    fn new(kind: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Rule evaluator. Holds only configuration; all history comes in through
/// [`OrchestratorState`].
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    policy: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(policy: DecisionConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DecisionConfig {
        &self.policy
    }

    /// Choose the action for `now`. `now` carries the local offset used
    /// for day-part and weekday classification.
    pub fn decide(&self, state: &OrchestratorState, now: DateTime<FixedOffset>) -> Action {
        let part = clock::day_part(&now);
        let now_utc = now.with_timezone(&Utc);

        if part == DayPart::Night {
            return self.night_action(state, now);
        }

        if self.should_check_messages(state, now_utc, part) {
            return Action::new(ActionKind::CheckMessages, "Time to check for new messages");
        }

        if let Some(action) = self.proactive_action(state, now_utc, part) {
            return action;
        }

        let kind = BACKGROUND_ROTATION
            [clock::rotation_index(state.background_tasks_completed, BACKGROUND_ROTATION.len())];
        Action::new(ActionKind::BackgroundTask { kind }, kind.description())
    }

    /// Users the proactive rule considers, in evaluation order: configured
    /// users first, then any other user with recorded activity.
    pub fn candidate_users<'a>(&'a self, state: &'a OrchestratorState) -> Vec<&'a str> {
        let mut users: Vec<&str> = self.policy.tracked_users.iter().map(String::as_str).collect();
        for user in state.users_silence_time.keys() {
            if !users.contains(&user.as_str()) {
                users.push(user.as_str());
            }
        }
        users
    }

    fn night_action(&self, state: &OrchestratorState, now: DateTime<FixedOffset>) -> Action {
        let cooldown = clock::delta_secs(self.policy.deep_thinking_cooldown_secs);
        let recent = state
            .last_deep_thinking
            .is_some_and(|last| now.with_timezone(&Utc) - last < cooldown);
        if recent {
            return Action::new(ActionKind::MemoryCleanup, "Night-time memory optimisation");
        }

        let topic = REFLECTION_TOPICS[clock::weekday_index(&now) % REFLECTION_TOPICS.len()];
        Action::new(
            ActionKind::DeepThinking {
                topic: topic.to_owned(),
                steps: self.policy.deep_thinking_steps,
            },
            "Night is time for self-reflection",
        )
    }

    fn should_check_messages(
        &self,
        state: &OrchestratorState,
        now: DateTime<Utc>,
        part: DayPart,
    ) -> bool {
        let Some(last) = state.last_message_check else {
            return true;
        };
        let interval = clock::poll_interval(
            part,
            self.policy.day_poll_interval_secs,
            self.policy.night_poll_interval_secs,
        );
        let elapsed = u64::try_from((now - last).num_seconds()).unwrap_or(0);
        elapsed >= interval.as_secs()
    }

    fn proactive_action(
        &self,
        state: &OrchestratorState,
        now: DateTime<Utc>,
        part: DayPart,
    ) -> Option<Action> {
        if part == DayPart::Night {
            return None;
        }

        let evening_threshold = self.policy.evening_silence_minutes.saturating_mul(60);
        let casual_threshold = self.policy.proactive_silence_minutes.saturating_mul(60);

        for user in self.candidate_users(state) {
            let silence = state.silence_secs(user, now);
            let minutes = silence / 60;

            if part == DayPart::Evening && silence > evening_threshold {
                return Some(Action::new(
                    ActionKind::ProactiveCare {
                        user_id: user.to_owned(),
                        topics: EVENING_SUPPORT_TOPICS.iter().map(|t| (*t).to_owned()).collect(),
                    },
                    format!("Evening check-in after {minutes} minutes of silence"),
                ));
            }

            if silence > casual_threshold {
                return Some(Action::new(
                    ActionKind::ProactiveMessage {
                        user_id: user.to_owned(),
                        style: ProactiveStyle::CasualCheck,
                    },
                    format!("Silence for {minutes} minutes"),
                ));
            }
        }
        None
    }
}
