//! End-to-end decision scenarios over realistic state histories.

use crate::helpers::{local, utc};
use chrono::{Datelike, TimeDelta};
use vigil::clock;
use vigil::config::DecisionConfig;
use vigil::decision::{
    ActionKind, BackgroundKind, DecisionEngine, EVENING_SUPPORT_TOPICS, REFLECTION_TOPICS,
};
use vigil::state::OrchestratorState;

fn engine_tracking(users: &[&str]) -> DecisionEngine {
    DecisionEngine::new(DecisionConfig {
        tracked_users: users.iter().map(|u| (*u).to_owned()).collect(),
        ..DecisionConfig::default()
    })
}

#[test]
fn reflection_topic_rotates_through_the_week() {
    let engine = DecisionEngine::default();
    // 2024-01-01 (Monday) through 2024-01-07 (Sunday) at 02:15 local.
    for day in 1..=7 {
        let now = local(day, 2, 15);
        let expected = REFLECTION_TOPICS[now.weekday().num_days_from_monday() as usize];
        match engine.decide(&OrchestratorState::default(), now).kind {
            ActionKind::DeepThinking { topic, steps } => {
                assert_eq!(topic, expected, "day {day}");
                assert_eq!(steps, 50);
            }
            other => panic!("day {day}: expected deep thinking, got {other:?}"),
        }
    }
}

#[test]
fn day_part_uses_local_hour_not_utc() {
    // 02:15 at UTC+3 is 23:15 UTC the previous day; still night locally.
    let now = local(3, 2, 15);
    assert!(clock::is_night(&now));
    let kind = DecisionEngine::default()
        .decide(&OrchestratorState::default(), now)
        .kind;
    assert!(matches!(kind, ActionKind::DeepThinking { .. }), "{kind:?}");
}

#[test]
fn evening_care_for_silent_user() {
    let engine = engine_tracking(&["u1"]);
    let now = local(3, 23, 10);
    let mut state = OrchestratorState {
        last_message_check: Some(utc(now) - TimeDelta::minutes(1)),
        ..OrchestratorState::default()
    };
    state.record_user_activity("u1", utc(now) - TimeDelta::minutes(40));

    let action = engine.decide(&state, now);
    assert_eq!(
        action.kind,
        ActionKind::ProactiveCare {
            user_id: "u1".to_owned(),
            topics: EVENING_SUPPORT_TOPICS.iter().map(|t| (*t).to_owned()).collect(),
        }
    );
}

#[test]
fn polling_takes_priority_over_proactive() {
    let engine = engine_tracking(&["u1"]);
    let now = local(3, 23, 10);
    let mut state = OrchestratorState {
        last_message_check: Some(utc(now) - TimeDelta::minutes(6)),
        ..OrchestratorState::default()
    };
    state.record_user_activity("u1", utc(now) - TimeDelta::hours(3));
    assert_eq!(engine.decide(&state, now).kind, ActionKind::CheckMessages);
}

#[test]
fn proactive_rule_is_monotonic_in_silence() {
    // Once a user's silence triggers outreach, longer silence still does.
    let engine = engine_tracking(&["u1"]);
    let now = local(3, 14, 0);
    let mut triggered = false;
    for minutes in (0..=300).step_by(15) {
        let mut state = OrchestratorState {
            last_message_check: Some(utc(now) - TimeDelta::minutes(1)),
            ..OrchestratorState::default()
        };
        state.record_user_activity("u1", utc(now) - TimeDelta::minutes(minutes));
        let proactive = matches!(
            engine.decide(&state, now).kind,
            ActionKind::ProactiveMessage { .. }
        );
        assert!(!triggered || proactive, "silence {minutes} stopped triggering");
        triggered |= proactive;
    }
    assert!(triggered);
}

#[test]
fn first_triggering_user_wins() {
    let engine = engine_tracking(&["quiet", "chatty"]);
    let now = local(3, 15, 0);
    let mut state = OrchestratorState {
        last_message_check: Some(utc(now) - TimeDelta::minutes(1)),
        ..OrchestratorState::default()
    };
    state.record_user_activity("chatty", utc(now) - TimeDelta::minutes(5));
    state.record_user_activity("quiet", utc(now) - TimeDelta::hours(4));
    state.record_user_activity("untracked", utc(now) - TimeDelta::hours(9));

    assert_eq!(engine.decide(&state, now).kind.recipient(), Some("quiet"));
}

#[test]
fn background_rotation_cycles_over_a_day() {
    let engine = DecisionEngine::default();
    let now = local(3, 16, 0);
    let mut state = OrchestratorState {
        last_message_check: Some(utc(now) - TimeDelta::minutes(1)),
        ..OrchestratorState::default()
    };
    let mut seen = Vec::new();
    for _ in 0..8 {
        match engine.decide(&state, now).kind {
            ActionKind::BackgroundTask { kind } => seen.push(kind),
            other => panic!("expected background task, got {other:?}"),
        }
        state.background_tasks_completed += 1;
    }
    assert_eq!(&seen[..4], &seen[4..]);
    assert_eq!(seen[0], BackgroundKind::AnalyzePatterns);
    assert_eq!(seen[3], BackgroundKind::PrepareContent);
}
