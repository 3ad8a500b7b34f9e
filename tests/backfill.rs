// tests/backfill.rs

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use assetflow::asset::{AssetGraph, Operator};
use assetflow::backfill::{
    BackfillConfig, BackfillManager, MAX_BACKFILL_TASKS, TaskStatus, scheduled_instants,
};
use assetflow::engine::{OrchestrationConfig, OrchestrationEngine};
use assetflow::errors::FlowError;
use assetflow::schedule::{Schedule, StaticGraphRegistry, Trigger};
use assetflow::store::{FileStore, MemoryStore, StateStore};
use assetflow::types::OnFailure;
use assetflow_test_utils::builders::asset_with;
use assetflow_test_utils::operators::ConcurrencyGauge;
use assetflow_test_utils::{init_tracing, with_timeout};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Value, json};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn day(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
}

/// Records `scheduled_for` of every run; fails runs listed in `failing`
/// while `fail_enabled` is set.
#[derive(Clone, Default)]
struct PartitionLog {
    seen: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<Vec<String>>>,
    fail_enabled: Arc<AtomicBool>,
}

impl PartitionLog {
    fn new() -> Self {
        let log = Self::default();
        log.fail_enabled.store(true, Ordering::SeqCst);
        log
    }

    fn fail_at(&self, at: DateTime<Utc>) {
        self.failing.lock().unwrap().push(stamp(at));
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn operator(&self) -> Operator {
        let log = self.clone();
        Operator::source("load", move |_, ctx| {
            let at = ctx
                .config_value("scheduled_for")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            assert!(ctx.config_value("backfill_id").is_some());
            log.seen.lock().unwrap().push(at.clone());
            let should_fail = log.fail_enabled.load(Ordering::SeqCst)
                && log.failing.lock().unwrap().contains(&at);
            if should_fail {
                anyhow::bail!("no data for {at}");
            }
            Ok(json!({ "partition": at }))
        })
        .unwrap()
    }
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

struct Harness {
    manager: BackfillManager,
    store: Arc<MemoryStore>,
    schedule: Schedule,
}

fn harness(trigger: Trigger, op: Operator) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let graph = AssetGraph::builder("daily")
        .asset(asset_with("load", op))
        .build()
        .unwrap();
    let registry = Arc::new(StaticGraphRegistry::new().with_graph(graph));
    let schedule = Schedule::new("hourly", trigger, "daily", "UTC", Utc::now());
    store.save_schedule(&schedule).unwrap();
    let engine = OrchestrationEngine::new(OrchestrationConfig::default(), store.clone());
    Harness {
        manager: BackfillManager::new(store.clone(), registry, engine),
        store,
        schedule,
    }
}

fn statuses(h: &Harness, backfill_id: &str) -> Vec<TaskStatus> {
    h.manager
        .list_tasks(backfill_id)
        .unwrap()
        .iter()
        .map(|t| t.status)
        .collect()
}

#[test]
fn test_cron_instants_are_start_inclusive_end_exclusive() -> TestResult {
    let instants = scheduled_instants(&Trigger::cron("0 0 * * * *"), day(1, 0), day(1, 3), Tz::UTC)?;
    assert_eq!(instants, vec![day(1, 0), day(1, 1), day(1, 2)]);
    Ok(())
}

#[test]
fn test_interval_instants_step_from_start() -> TestResult {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap();
    let instants = scheduled_instants(&Trigger::interval(1800), start, day(1, 2), Tz::UTC)?;
    assert_eq!(instants.len(), 4);
    assert_eq!(instants[0], start);
    assert_eq!(instants[3], Utc.with_ymd_and_hms(2024, 1, 1, 1, 40, 0).unwrap());
    Ok(())
}

#[test]
fn test_hourly_interval_over_a_day_yields_24_tasks() -> TestResult {
    let instants = scheduled_instants(&Trigger::interval(3600), day(1, 0), day(2, 0), Tz::UTC)?;
    assert_eq!(instants.len(), 24);
    for pair in instants.windows(2) {
        assert_eq!(pair[1] - pair[0], chrono::Duration::hours(1));
    }
    Ok(())
}

#[test]
fn test_cron_instants_follow_timezone() -> TestResult {
    let oslo: Tz = "Europe/Oslo".parse().unwrap();
    let instants = scheduled_instants(&Trigger::cron("0 0 2 * * *"), day(1, 0), day(3, 0), oslo)?;
    assert_eq!(instants, vec![day(1, 1), day(2, 1)]);
    Ok(())
}

#[test]
fn test_generation_is_capped() -> TestResult {
    let instants = scheduled_instants(&Trigger::interval(1), day(1, 0), day(1, 3), Tz::UTC)?;
    assert_eq!(instants.len(), MAX_BACKFILL_TASKS);
    Ok(())
}

#[test]
fn test_invalid_ranges_and_triggers_are_rejected() {
    let err = scheduled_instants(&Trigger::interval(60), day(2, 0), day(1, 0), Tz::UTC).unwrap_err();
    assert!(matches!(err, FlowError::Backfill(_)));
    let err = scheduled_instants(&Trigger::interval(60), day(1, 0), day(1, 0), Tz::UTC).unwrap_err();
    assert!(matches!(err, FlowError::Backfill(_)));

    let err = scheduled_instants(&Trigger::event("ping"), day(1, 0), day(2, 0), Tz::UTC).unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
}

#[test]
fn test_create_backfill_persists_pending_tasks() -> TestResult {
    let h = harness(Trigger::interval(3600), PartitionLog::new().operator());
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 4));
    let id = config.backfill_id.clone();

    let tasks = h.manager.create_backfill(config)?;
    assert_eq!(tasks.len(), 4);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));

    let status = h.manager.get_backfill_status(&id)?;
    assert_eq!(status.total, 4);
    assert_eq!(status.pending, 4);
    assert!(h.store.load_backfill(&id)?.is_some());
    Ok(())
}

#[test]
fn test_create_backfill_rejects_unknown_schedule_and_event_triggers() {
    let h = harness(Trigger::event("ping"), PartitionLog::new().operator());

    let err = h
        .manager
        .create_backfill(BackfillConfig::new("missing", day(1, 0), day(2, 0)))
        .unwrap_err();
    assert!(matches!(err, FlowError::Backfill(_)));

    let err = h
        .manager
        .create_backfill(BackfillConfig::new(&h.schedule.id, day(1, 0), day(2, 0)))
        .unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));

    assert!(h.manager.get_backfill_status("missing").is_err());
}

#[tokio::test]
async fn test_sequential_backfill_runs_in_order_with_scheduled_time() -> TestResult {
    init_tracing();
    let log = PartitionLog::new();
    let h = harness(Trigger::interval(3600), log.operator());
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 3));
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let status = with_timeout(h.manager.run_backfill(&id)).await?;

    assert_eq!(status.completed, 3);
    assert!(status.is_done());
    assert_eq!(
        log.seen(),
        vec!["2024-01-01T00:00:00Z", "2024-01-01T01:00:00Z", "2024-01-01T02:00:00Z"]
    );
    for task in h.manager.list_tasks(&id)? {
        assert!(task.run_id.is_some());
        assert!(task.finished_at.is_some());
    }
    Ok(())
}

#[tokio::test]
async fn test_fail_fast_leaves_remaining_tasks_pending() -> TestResult {
    let log = PartitionLog::new();
    log.fail_at(day(1, 1));
    let h = harness(Trigger::interval(3600), log.operator());
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 4))
        .with_on_failure(OnFailure::FailFast);
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let status = with_timeout(h.manager.run_backfill(&id)).await?;

    assert_eq!(
        statuses(&h, &id),
        vec![
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Pending,
            TaskStatus::Pending
        ]
    );
    assert_eq!(status.pending, 2);
    let failed = &h.manager.list_tasks(&id)?[1];
    assert!(failed.error.as_deref().unwrap().contains("no data"));
    Ok(())
}

#[tokio::test]
async fn test_continue_runs_past_failures() -> TestResult {
    let log = PartitionLog::new();
    log.fail_at(day(1, 1));
    let h = harness(Trigger::interval(3600), log.operator());
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 3));
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let status = with_timeout(h.manager.run_backfill(&id)).await?;
    assert_eq!(status.completed, 2);
    assert_eq!(status.failed, 1);
    assert_eq!(log.seen().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_retry_reruns_failed_task() -> TestResult {
    let (op, calls) = assetflow_test_utils::operators::flaky("load", 2, false);
    let h = harness(Trigger::interval(3600), op);
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 2))
        .with_on_failure(OnFailure::Retry)
        .with_retry_attempts(2);
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let status = with_timeout(h.manager.run_backfill(&id)).await?;

    assert_eq!(status.completed, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let tasks = h.manager.list_tasks(&id)?;
    assert_eq!(tasks[0].retry_count, 2);
    assert_eq!(tasks[1].retry_count, 0);
    assert!(tasks[0].error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_retry_gives_up_after_attempts() -> TestResult {
    let log = PartitionLog::new();
    log.fail_at(day(1, 0));
    let h = harness(Trigger::interval(3600), log.operator());
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 1))
        .with_on_failure(OnFailure::Retry)
        .with_retry_attempts(1);
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let status = with_timeout(h.manager.run_backfill(&id)).await?;
    assert_eq!(status.failed, 1);
    assert_eq!(log.seen().len(), 2);
    assert_eq!(h.manager.list_tasks(&id)?[0].retry_count, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_backfill_respects_limit() -> TestResult {
    let gauge = ConcurrencyGauge::new();
    let h = harness(
        Trigger::interval(3600),
        gauge.operator("load", Duration::from_millis(40)),
    );
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 6)).parallel(2);
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let status = with_timeout(h.manager.run_backfill(&id)).await?;

    assert_eq!(status.completed, 6);
    assert!(gauge.max_observed() <= 2, "saw {}", gauge.max_observed());
    Ok(())
}

/// The first call waits until a second call is running and then fails;
/// every later call succeeds after a short hold.
fn first_call_fails_while_second_runs() -> (Operator, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let op = Operator::source("load", move |_, _| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 1 {
            let deadline = Instant::now() + Duration::from_secs(2);
            while counter.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            anyhow::bail!("partition is corrupt");
        }
        std::thread::sleep(Duration::from_millis(50));
        Ok(json!("loaded"))
    })
    .unwrap();
    (op, calls)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_fail_fast_cancels_unstarted_tasks() -> TestResult {
    init_tracing();
    let (op, calls) = first_call_fails_while_second_runs();
    let h = harness(Trigger::interval(3600), op);
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 6))
        .parallel(2)
        .with_on_failure(OnFailure::FailFast);
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let status = with_timeout(h.manager.run_backfill(&id)).await?;

    // The in-flight task finished; nothing else started.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(status.failed, 1);
    assert_eq!(status.completed, 1);
    assert_eq!(status.pending, 4);
    assert_eq!(status.running, 0);
    assert!(
        statuses(&h, &id)
            .iter()
            .all(|s| matches!(s, TaskStatus::Pending | TaskStatus::Completed | TaskStatus::Failed))
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_backfill_on_file_store() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let store: Arc<dyn StateStore> = Arc::new(FileStore::new(dir.path()));
    let log = PartitionLog::new();
    let graph = AssetGraph::builder("daily")
        .asset(asset_with("load", log.operator()))
        .build()?;
    let registry = Arc::new(StaticGraphRegistry::new().with_graph(graph));
    let schedule = Schedule::new("hourly", Trigger::interval(3600), "daily", "UTC", Utc::now());
    store.save_schedule(&schedule)?;
    let engine = OrchestrationEngine::new(OrchestrationConfig::default(), store.clone());
    let manager = BackfillManager::new(store, registry, engine);

    // Every task persists the same pipeline state document.
    let config = BackfillConfig::new(&schedule.id, day(1, 0), day(3, 0)).parallel(8);
    let id = config.backfill_id.clone();
    manager.create_backfill(config)?;
    let status = with_timeout(manager.run_backfill(&id)).await?;

    assert_eq!(status.completed, 48);
    assert_eq!(status.failed, 0);
    assert_eq!(log.seen().len(), 48);
    Ok(())
}

#[tokio::test]
async fn test_rerun_only_repeats_unfinished_tasks() -> TestResult {
    let log = PartitionLog::new();
    log.fail_at(day(1, 1));
    let h = harness(Trigger::interval(3600), log.operator());
    let config = BackfillConfig::new(&h.schedule.id, day(1, 0), day(1, 3));
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let first = with_timeout(h.manager.run_backfill(&id)).await?;
    assert_eq!(first.failed, 1);

    log.fail_enabled.store(false, Ordering::SeqCst);
    let second = with_timeout(h.manager.run_backfill(&id)).await?;

    assert_eq!(second.completed, 3);
    assert_eq!(log.seen().len(), 4);
    assert_eq!(log.seen()[3], "2024-01-01T01:00:00Z");
    Ok(())
}

#[tokio::test]
async fn test_run_backfill_requires_registered_graph() -> TestResult {
    let h = harness(Trigger::interval(3600), PartitionLog::new().operator());
    let mut orphan = Schedule::new("orphan", Trigger::interval(3600), "nowhere", "UTC", Utc::now());
    orphan.id = "orphan".to_string();
    h.store.save_schedule(&orphan)?;

    let config = BackfillConfig::new("orphan", day(1, 0), day(1, 1));
    let id = config.backfill_id.clone();
    h.manager.create_backfill(config)?;

    let err = h.manager.run_backfill(&id).await.unwrap_err();
    assert!(matches!(err, FlowError::Backfill(_)));
    assert!(h.manager.run_backfill("unknown").await.is_err());
    Ok(())
}
