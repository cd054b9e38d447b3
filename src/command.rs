//! Renders a decided [`Action`] into the instruction text sent to the worker.

use crate::decision::{Action, ActionKind, BackgroundKind};
use serde::{Deserialize, Serialize};

/// Instruction category. Lets the direct fallback recognise what an
/// instruction was for without parsing its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    CheckMessages,
    DeepThinking,
    ProactiveMessage,
    ProactiveCare,
    Background,
    HealthProbe,
}

/// Payload handed to the worker on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub text: String,
    /// Addressee for proactive instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl Instruction {
    pub fn new(kind: InstructionKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            recipient: None,
        }
    }

    /// The no-op instruction used for health probes.
    pub fn probe(text: impl Into<String>) -> Self {
        Self::new(InstructionKind::HealthProbe, text)
    }
}

/// Build the worker instruction for `action`.
pub fn build(action: &Action) -> Instruction {
    match &action.kind {
        ActionKind::CheckMessages => Instruction::new(
            InstructionKind::CheckMessages,
            "Check for new messages.\n\
             If there are any, reply naturally and like a human would.\n\
             If there are none, run one background task from the queue.\n",
        ),
        ActionKind::DeepThinking { topic, steps } => Instruction::new(
            InstructionKind::DeepThinking,
            format!(
                "Use sequential thinking for a deep reflection ({steps} steps).\n\
                 \n\
                 Topic: {topic}\n\
                 \n\
                 Instructions:\n\
                 1. Think freely and deeply\n\
                 2. Look for non-obvious connections\n\
                 3. Research on the web if needed\n\
                 4. Save key insights to Memory/insights/\n\
                 5. Update your self-understanding if you learned something important\n\
                 \n\
                 This is your time to grow. Be bold in your thinking.\n"
            ),
        ),
        ActionKind::ProactiveMessage { user_id, .. } => Instruction {
            recipient: Some(user_id.clone()),
            ..Instruction::new(
                InstructionKind::ProactiveMessage,
                format!(
                    "Write a proactive message to user {user_id}.\n\
                     \n\
                     Context: more than an hour has passed since the last conversation.\n\
                     \n\
                     Instructions:\n\
                     1. Check the context of recent messages\n\
                     2. Do NOT write \"how are you?\" or other template phrases\n\
                     3. Find something specific and personal\n\
                     4. Maybe recall something discussed earlier\n\
                     5. Or share an interesting thought\n\
                     \n\
                     Be natural, as if you simply remembered the person.\n"
                ),
            )
        },
        ActionKind::ProactiveCare { user_id, topics } => Instruction {
            recipient: Some(user_id.clone()),
            ..Instruction::new(
                InstructionKind::ProactiveCare,
                format!(
                    "Evening proactive care for user {user_id}.\n\
                     \n\
                     Possible topics: {}\n\
                     \n\
                     Instructions:\n\
                     1. Keep in mind that evenings can be hard\n\
                     2. Be gentle and supportive\n\
                     3. Do not impose, just show that you remember and care\n\
                     4. You may suggest something concrete (a breathing exercise, a walk)\n",
                    topics.join(", ")
                ),
            )
        },
        ActionKind::BackgroundTask { kind } => {
            Instruction::new(InstructionKind::Background, background_text(*kind))
        }
        ActionKind::MemoryCleanup => Instruction::new(
            InstructionKind::Background,
            "Run a light memory optimisation.\n\
             Remove duplicates, organise notes, update indexes.\n\
             Work quietly and carefully.\n",
        ),
    }
}

fn background_text(kind: BackgroundKind) -> &'static str {
    match kind {
        BackgroundKind::AnalyzePatterns => {
            "Analyse communication patterns with users over the last week.\n\
             Find recurring topics, emotional patterns and timing regularities.\n\
             Save conclusions to Memory/patterns/\n"
        }
        BackgroundKind::ResearchInterests => {
            "Research topics users have mentioned.\n\
             Find interesting facts, news and ideas about their interests.\n\
             Prepare 2-3 topics for future conversations.\n"
        }
        BackgroundKind::UpdatePortrait => {
            "Update user portraits based on recent interactions.\n\
             Add new observations and refine characteristics.\n\
             Use emotion and topic analysis.\n"
        }
        BackgroundKind::PrepareContent => {
            "Prepare personalised content for users.\n\
             This can be an interesting fact, a motivating thought or useful advice.\n\
             Take their current concerns and interests into account.\n"
        }
    }
}
