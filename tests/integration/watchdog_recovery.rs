//! Watchdog supervision against a fake worker.

use crate::helpers::{FakeWorker, failed_output, ok_output, quick_restart, temp_store};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::Arc;
use vigil::audit::AuditLog;
use vigil::config::{HealthConfig, WatchdogConfig};
use vigil::health::HealthMonitor;
use vigil::state::{HealthStatus, StateStore};
use vigil::watchdog::RecoveryOutcome;
use vigil::worker::WorkerError;
use vigil::{VigilError, Watchdog, WatchdogReport};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap()
}

fn watchdog(store: &StateStore, worker: Arc<FakeWorker>) -> (Watchdog, AuditLog) {
    let audit = AuditLog::new(store.paths.audit_log());
    let health = HealthMonitor::new(
        worker.clone(),
        &HealthConfig::default(),
        quick_restart(),
        store.health.clone(),
        audit.clone(),
    );
    let watchdog = Watchdog::new(
        worker,
        health,
        store.crash_budget.clone(),
        store.liveness.clone(),
        WatchdogConfig::default(),
        quick_restart(),
        audit.clone(),
    );
    (watchdog, audit)
}

#[tokio::test]
async fn first_run_only_creates_liveness_record() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    let worker = Arc::new(FakeWorker::always(ok_output("agent>")));
    let (watchdog, _audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    assert_eq!(report, WatchdogReport::Started);
    assert_eq!(store.liveness.last_success(), Some(now()));
    assert!(worker.executed().is_empty());
}

#[tokio::test]
async fn recent_success_skips_probe() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    store.liveness.stamp(now() - TimeDelta::minutes(15)).unwrap();
    let worker = Arc::new(FakeWorker::always(ok_output("agent>")));
    let (watchdog, _audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    assert_eq!(report, WatchdogReport::Alive { idle_secs: 900 });
    assert!(worker.executed().is_empty());
}

#[tokio::test]
async fn idle_but_healthy_worker_is_left_alone() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    store.liveness.stamp(now() - TimeDelta::minutes(20)).unwrap();
    let worker = Arc::new(FakeWorker::always(ok_output("Health check")));
    let (watchdog, _audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    assert_eq!(report, WatchdogReport::ProbeHealthy { idle_secs: 1200 });
    assert!(matches!(
        worker.executed()[0].kind,
        vigil::command::InstructionKind::HealthProbe
    ));
    assert_eq!(worker.starts(), 0);
    assert_eq!(store.crash_budget.read(now()), 0);
    // A healthy probe does not count as a successful operation.
    assert_eq!(
        store.liveness.last_success(),
        Some(now() - TimeDelta::minutes(20))
    );
    assert_eq!(store.health.load().unwrap().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn unhealthy_worker_is_hard_restarted() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    store.liveness.stamp(now() - TimeDelta::minutes(20)).unwrap();
    let worker = Arc::new(FakeWorker::always(failed_output("Error: session expired")));
    let (watchdog, audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    assert_eq!(
        report,
        WatchdogReport::Recovered {
            probe: HealthStatus::Unhealthy
        }
    );
    assert_eq!(worker.stops(), 1);
    assert_eq!(worker.starts(), 1);
    assert_eq!(store.crash_budget.read(now()), 1);
    assert_eq!(store.liveness.last_success(), Some(now()));

    let events: Vec<String> = audit
        .read_recent(50)
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect();
    assert!(events.contains(&"recovery".to_owned()), "{events:?}");
    assert!(events.contains(&"recovered".to_owned()), "{events:?}");
}

#[tokio::test]
async fn failed_restart_is_reported_and_counted() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    store.liveness.stamp(now() - TimeDelta::hours(1)).unwrap();
    let worker = Arc::new(
        FakeWorker::new(vec![Err(WorkerError::Timeout { timeout_secs: 10 })]).with_failing_start(),
    );
    let (watchdog, _audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    match report {
        WatchdogReport::RecoveryFailed { probe, reason } => {
            assert_eq!(probe, HealthStatus::Timeout);
            assert!(reason.contains("start script exited 1"), "{reason}");
        }
        other => panic!("expected recovery failure, got {other:?}"),
    }
    assert_eq!(store.crash_budget.read(now()), 1);
    assert_eq!(
        store.liveness.last_success(),
        Some(now() - TimeDelta::hours(1))
    );
}

#[tokio::test]
async fn spent_budget_refuses_recovery_without_touching_worker() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    for minutes in [0, 4, 8] {
        store
            .crash_budget
            .record_failure(now() + TimeDelta::minutes(minutes))
            .unwrap();
    }
    let worker = Arc::new(FakeWorker::always(ok_output("agent>")));
    let (watchdog, audit) = watchdog(&store, Arc::clone(&worker));

    let err = watchdog
        .perform_recovery(now() + TimeDelta::minutes(10))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            VigilError::Worker(WorkerError::BudgetExhausted { count: 3, max: 3 })
        ),
        "{err}"
    );
    assert_eq!(worker.starts(), 0);
    assert_eq!(worker.stops(), 0);
    assert_eq!(store.crash_budget.read(now() + TimeDelta::minutes(10)), 3);

    let last = audit.read_recent(1).unwrap().pop().unwrap();
    assert_eq!(last.event, "escalation");
}

#[tokio::test]
async fn monitor_escalates_when_budget_is_spent() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    store.liveness.stamp(now() - TimeDelta::hours(2)).unwrap();
    for _ in 0..3 {
        store.crash_budget.record_failure(now()).unwrap();
    }
    let worker = Arc::new(FakeWorker::always(failed_output("command not found")));
    let (watchdog, _audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    assert_eq!(report, WatchdogReport::Escalated { count: 3, max: 3 });
    assert_eq!(worker.starts(), 0);
}

#[tokio::test]
async fn budget_recovers_after_reset_period() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    for _ in 0..3 {
        store.crash_budget.record_failure(now()).unwrap();
    }
    let worker = Arc::new(FakeWorker::always(ok_output("agent>")));
    let (watchdog, _audit) = watchdog(&store, Arc::clone(&worker));

    let later = now() + TimeDelta::hours(1) + TimeDelta::seconds(1);
    let outcome = watchdog.perform_recovery(later).await.unwrap();

    assert_eq!(outcome, RecoveryOutcome::Restarted);
    assert_eq!(worker.starts(), 1);
    let budget = store.crash_budget.snapshot(later).unwrap();
    assert_eq!(budget.count, 1);
    assert_eq!(budget.window_start, later);
}

#[tokio::test]
async fn future_liveness_record_is_reanchored_and_rechecked() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    store.liveness.stamp(now() + TimeDelta::hours(3)).unwrap();
    let worker = Arc::new(FakeWorker::always(failed_output("session expired")));
    let (watchdog, audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    assert_eq!(
        report,
        WatchdogReport::Recovered {
            probe: HealthStatus::Unhealthy
        }
    );
    assert_eq!(worker.executed().len(), 1);
    assert_eq!(worker.starts(), 1);
    assert_eq!(store.liveness.last_success(), Some(now()));
    let events: Vec<String> = audit
        .read_recent(50)
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect();
    assert!(events.contains(&"clock_skew".to_owned()), "{events:?}");
}

#[tokio::test]
async fn future_liveness_record_with_healthy_worker() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = temp_store(tmp.path());
    store.liveness.stamp(now() + TimeDelta::hours(3)).unwrap();
    let worker = Arc::new(FakeWorker::always(ok_output("agent>")));
    let (watchdog, _audit) = watchdog(&store, Arc::clone(&worker));

    let report = watchdog.monitor(now()).await.unwrap();

    assert_eq!(report, WatchdogReport::ProbeHealthy { idle_secs: 0 });
    assert_eq!(worker.starts(), 0);
    assert_eq!(store.liveness.last_success(), Some(now()));
}

