// tests/file_store.rs

use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use assetflow::asset::AssetResult;
use assetflow::backfill::{BackfillConfig, BackfillTask, TaskStatus};
use assetflow::checkpoint::Checkpoint;
use assetflow::engine::ExecutionState;
use assetflow::schedule::{EventStatus, Schedule, ScheduleEvent, Trigger, TriggerKind};
use assetflow::store::{FileStore, StateStore};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn checkpoint(run_id: &str, asset: &str) -> Checkpoint {
    Checkpoint {
        pipeline_id: "etl".into(),
        run_id: run_id.into(),
        asset_name: asset.into(),
        timestamp: Utc::now(),
        result: AssetResult::success(asset, Some(json!({ "rows": 3 })), vec![]),
    }
}

#[test]
fn test_state_survives_a_new_store_instance() -> TestResult {
    let dir = TempDir::new()?;
    let mut state = ExecutionState::new("etl", "run-1");
    state.mark_completed("a");
    state.mark_failed("b");
    FileStore::new(dir.path()).save_state(&state)?;

    let reopened = FileStore::new(dir.path());
    let loaded = reopened.load_state("etl")?.expect("state on disk");
    assert!(loaded.is_completed("a"));
    assert!(loaded.is_failed("b"));
    assert_eq!(loaded.run_id, "run-1");

    assert!(reopened.clear_state("etl")?);
    assert!(!reopened.clear_state("etl")?);
    assert!(reopened.load_state("etl")?.is_none());
    Ok(())
}

#[test]
fn test_concurrent_writers_of_one_state_all_succeed() -> TestResult {
    let dir = TempDir::new()?;
    let store = Arc::new(FileStore::new(dir.path()));

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        let mut state = ExecutionState::new("p", format!("run-{t}-{i}"));
                        state.mark_completed("a");
                        store.save_state(&state)
                    })
                    .filter(Result::is_err)
                    .count()
            })
        })
        .collect();

    let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(failures, 0);

    // The last rename wins with a complete document.
    let loaded = store.load_state("p")?.expect("state on disk");
    assert!(loaded.is_completed("a"));
    assert!(loaded.run_id.starts_with("run-"));

    // No temp files are left next to the record.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("state"))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) != Some("json"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn test_checkpoints_append_in_order() -> TestResult {
    let dir = TempDir::new()?;
    let store = FileStore::new(dir.path());
    for asset in ["a", "b", "c"] {
        store.save_checkpoint(&checkpoint("run-7", asset))?;
    }

    let names: Vec<String> = FileStore::new(dir.path())
        .load_checkpoints("run-7")?
        .into_iter()
        .map(|c| c.asset_name)
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(store.load_checkpoints("other")?.is_empty());
    Ok(())
}

#[test]
fn test_torn_checkpoint_line_is_skipped() -> TestResult {
    let dir = TempDir::new()?;
    let store = FileStore::new(dir.path());
    store.save_checkpoint(&checkpoint("run-8", "a"))?;

    let path = dir.path().join("checkpoints").join("run-8.jsonl");
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(b"{\"pipeline_id\": \"etl\", \"run_")?;

    let loaded = store.load_checkpoints("run-8")?;
    assert_eq!(loaded.len(), 1);
    Ok(())
}

#[test]
fn test_schedules_are_listed_by_creation_time() -> TestResult {
    let dir = TempDir::new()?;
    let store = FileStore::new(dir.path());
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

    let late = Schedule::new("late", Trigger::interval(60), "g", "UTC", base + Duration::hours(1))
        .with_id("late");
    let early = Schedule::new("early", Trigger::cron("0 0 * * * *"), "g", "UTC", base)
        .with_id("early");
    store.save_schedule(&late)?;
    store.save_schedule(&early)?;

    let ids: Vec<String> = store.list_schedules()?.into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["early", "late"]);
    assert_eq!(store.load_schedule("early")?, Some(early));

    assert!(store.delete_schedule("late")?);
    assert!(!store.delete_schedule("late")?);
    assert_eq!(store.list_schedules()?.len(), 1);
    Ok(())
}

#[test]
fn test_schedule_ids_with_separators_are_stored_safely() -> TestResult {
    let dir = TempDir::new()?;
    let store = FileStore::new(dir.path());
    let schedule = Schedule::new("nightly", Trigger::interval(60), "g", "UTC", Utc::now())
        .with_id("config:nightly/../x");
    store.save_schedule(&schedule)?;

    assert_eq!(store.load_schedule("config:nightly/../x")?, Some(schedule));
    assert!(dir.path().join("schedules").is_dir());
    Ok(())
}

#[test]
fn test_events_are_an_append_only_log() -> TestResult {
    let dir = TempDir::new()?;
    let store = FileStore::new(dir.path());
    let started = ScheduleEvent::started("s1", TriggerKind::Cron, "run-1", Utc::now());
    let finished = started.finished(EventStatus::Failed, Some("boom".into()));
    store.save_event(&started)?;
    store.save_event(&finished)?;

    let events = store.list_events("s1")?;
    assert_eq!(events, vec![started, finished]);
    assert!(store.list_events("s2")?.is_empty());
    Ok(())
}

#[test]
fn test_backfill_tasks_are_replaced_and_sorted() -> TestResult {
    let dir = TempDir::new()?;
    let store = FileStore::new(dir.path());
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let config = BackfillConfig::new("s1", start, start + Duration::hours(3));
    store.save_backfill(&config)?;

    for h in [2, 0, 1] {
        store.save_backfill_task(&BackfillTask::pending(
            config.backfill_id.clone(),
            start + Duration::hours(h),
        ))?;
    }
    let mut first = store.list_backfill_tasks(&config.backfill_id)?.remove(0);
    first.status = TaskStatus::Completed;
    store.save_backfill_task(&first)?;

    let reopened = FileStore::new(dir.path());
    let tasks = reopened.list_backfill_tasks(&config.backfill_id)?;
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].scheduled_for, start);
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert!(tasks.windows(2).all(|w| w[0].scheduled_for < w[1].scheduled_for));
    assert_eq!(reopened.load_backfill(&config.backfill_id)?, Some(config));
    Ok(())
}

#[test]
fn test_missing_records_read_as_empty() -> TestResult {
    let dir = TempDir::new()?;
    let store = FileStore::new(dir.path().join("not-created-yet"));
    assert!(store.load_state("p")?.is_none());
    assert!(store.list_schedules()?.is_empty());
    assert!(store.list_backfill_tasks("b")?.is_empty());
    assert!(store.load_backfill("b")?.is_none());
    Ok(())
}
