//! Persistence of state documents, locks and config across store instances.

use crate::helpers::temp_store;
use chrono::{TimeDelta, TimeZone, Utc};
use vigil::VigilConfig;
use vigil::audit::{AuditLog, Severity};
use vigil::state::{HealthStatus, OrchestratorState};

#[test]
fn orchestrator_state_survives_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 1, 3, 9, 30, 0).unwrap();

    let mut state = OrchestratorState {
        last_message_check: Some(at),
        background_tasks_completed: 7,
        ..OrchestratorState::default()
    };
    state.record_user_activity("u1", at - TimeDelta::minutes(5));
    temp_store(tmp.path()).orchestrator.save(&state).unwrap();

    let reopened = temp_store(tmp.path()).orchestrator.load();
    assert_eq!(reopened, state);
}

#[test]
fn missing_fields_take_defaults() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    std::fs::create_dir_all(tmp.path()).unwrap();
    std::fs::write(
        store.paths.orchestrator_state(),
        r#"{"background_tasks_completed": 3}"#,
    )
    .unwrap();

    let state = store.orchestrator.load();
    assert_eq!(state.background_tasks_completed, 3);
    assert!(state.last_message_check.is_none());
    assert!(state.users_silence_time.is_empty());
}

#[test]
fn corrupt_state_falls_back_to_default() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    std::fs::write(store.paths.orchestrator_state(), "{not json").unwrap();
    assert_eq!(store.orchestrator.load(), OrchestratorState::default());
}

#[test]
fn crash_budget_is_shared_between_stores() {
    let tmp = tempfile::TempDir::new().unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();

    temp_store(tmp.path()).crash_budget.record_failure(now).unwrap();
    temp_store(tmp.path())
        .crash_budget
        .record_failure(now + TimeDelta::minutes(5))
        .unwrap();

    let store = temp_store(tmp.path());
    assert_eq!(store.crash_budget.read(now + TimeDelta::minutes(10)), 2);
    // Window opened at `now`; one hour later plus a second it has expired.
    assert_eq!(
        store
            .crash_budget
            .read(now + TimeDelta::hours(1) + TimeDelta::seconds(1)),
        0
    );
}

#[test]
fn health_and_liveness_records_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    let at = Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();

    store.health.save(HealthStatus::Timeout, at).unwrap();
    store.liveness.stamp(at).unwrap();

    let reopened = temp_store(tmp.path());
    let record = reopened.health.load().unwrap();
    assert_eq!(record.status, HealthStatus::Timeout);
    assert_eq!(record.observed_at, at);
    assert_eq!(reopened.liveness.last_success(), Some(at));

    let raw = std::fs::read_to_string(reopened.paths.health()).unwrap();
    assert!(raw.contains("\"TIMEOUT\""), "{raw}");
}

#[tokio::test]
async fn second_invocation_cannot_take_held_lock() {
    let tmp = tempfile::TempDir::new().unwrap();
    let first = temp_store(tmp.path());
    let second = temp_store(tmp.path());

    let guard = first.lock_state().await.unwrap();
    let err = second.lock_state().await.unwrap_err();
    assert!(matches!(err, vigil::VigilError::Lock(_)), "{err}");

    // The worker lock is independent.
    let _worker = second.lock_worker().await.unwrap();

    drop(guard);
    let _state = second.lock_state().await.unwrap();
}

#[test]
fn audit_entries_from_two_invocations_interleave() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("audit.jsonl");
    let first = AuditLog::new(&path);
    let second = AuditLog::new(&path);

    first.info("orchestrator", "decision", "check_messages");
    second.error("watchdog", "escalation", "budget spent");
    first.warn("runner", "fallback", "direct");

    let entries = AuditLog::new(&path).read_recent(10).unwrap();
    let events: Vec<&str> = entries.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(events, ["decision", "escalation", "fallback"]);
    assert_eq!(entries[0].invocation_id, entries[2].invocation_id);
    assert_ne!(entries[0].invocation_id, entries[1].invocation_id);
    assert_eq!(entries[1].severity, Severity::Error);
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("vigil.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[paths]
data_dir = "{}"

[decision]
tracked_users = ["u1", "u2"]
proactive_silence_minutes = 120

[watchdog]
max_crashes = 5

[audit]
max_bytes = 4096
"#,
            tmp.path().join("state").display()
        ),
    )
    .unwrap();

    let config = VigilConfig::load(Some(&path)).unwrap();
    assert_eq!(config.decision.tracked_users, ["u1", "u2"]);
    assert_eq!(config.decision.proactive_silence_minutes, 120);
    assert_eq!(config.decision.day_poll_interval_secs, 300);
    assert_eq!(config.watchdog.max_crashes, 5);
    assert_eq!(config.audit.max_bytes, 4096);
    assert_eq!(config.data_dir(), tmp.path().join("state"));
}
