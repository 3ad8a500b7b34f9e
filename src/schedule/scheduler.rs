// src/schedule/scheduler.rs

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::asset::{PipelineContext, new_run_id};
use crate::engine::OrchestrationEngine;
use crate::errors::{FlowError, Result};
use crate::schedule::model::{EventStatus, Schedule, ScheduleEvent, ScheduleStatus};
use crate::schedule::registry::GraphRegistry;
use crate::schedule::trigger::{Trigger, TriggerKind, parse_timezone};
use crate::store::StateStore;

/// Scheduler loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Runs allowed at once across all schedules; further triggers are
    /// skipped, not queued.
    pub max_concurrent_runs: usize,
    /// Active-run entries older than this are dropped to free their slot.
    /// The run itself keeps going.
    pub run_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_concurrent_runs: 4,
            run_timeout: Duration::from_secs(3600),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Run ids started in this tick.
    pub started: Vec<String>,
    /// Schedule ids that were due but hit the concurrency cap.
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started { run_id: String },
    /// The concurrency cap was reached.
    Skipped,
    /// The schedule was paused or deleted before the firing was recorded.
    Inactive,
}

#[derive(Debug)]
struct ActiveRun {
    schedule_id: String,
    started: Instant,
}

#[derive(Debug)]
struct Shared {
    store: Arc<dyn StateStore>,
    registry: Arc<dyn GraphRegistry>,
    engine: OrchestrationEngine,
    config: SchedulerConfig,
    active: Mutex<HashMap<String, ActiveRun>>,
    pending_events: Mutex<VecDeque<Value>>,
    /// Held across every load-modify-save of a schedule record.
    records: Mutex<()>,
    idle: Notify,
}

#[derive(Debug)]
struct LoopHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Time- and event-driven trigger loop.
///
/// The loop is one tokio task that calls [`tick`](Scheduler::tick) every
/// `poll_interval`; runs it starts are spawned separately and report their
/// terminal status as a second [`ScheduleEvent`].
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<LoopHandle>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        registry: Arc<dyn GraphRegistry>,
        engine: OrchestrationEngine,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                registry,
                engine,
                config,
                active: Mutex::new(HashMap::new()),
                pending_events: Mutex::new(VecDeque::new()),
                records: Mutex::new(()),
                idle: Notify::new(),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Create and persist an active schedule.
    pub fn create_schedule(
        &self,
        name: impl Into<String>,
        trigger: Trigger,
        graph_ref: impl Into<String>,
        timezone: impl Into<String>,
        config: Map<String, Value>,
    ) -> Result<Schedule> {
        let schedule = Schedule::new(name, trigger, graph_ref, timezone, Utc::now()).with_config(config);
        self.register(schedule)
    }

    /// Persist a fully built schedule, keeping the firing history of an
    /// existing schedule with the same id.
    pub fn register(&self, mut schedule: Schedule) -> Result<Schedule> {
        schedule.trigger.validate()?;
        parse_timezone(&schedule.timezone)?;
        if schedule.graph_ref.trim().is_empty() {
            return Err(FlowError::Schedule(format!(
                "schedule '{}' must reference a graph",
                schedule.name
            )));
        }

        let _records = lock(&self.shared.records);
        if let Some(existing) = self.shared.store.load_schedule(&schedule.id)? {
            schedule.last_triggered = existing.last_triggered;
            schedule.created_at = existing.created_at;
            schedule.status = existing.status;
        }

        self.shared.store.save_schedule(&schedule)?;
        info!(
            schedule = %schedule.name,
            id = %schedule.id,
            kind = %schedule.kind(),
            graph = %schedule.graph_ref,
            "registered schedule"
        );
        Ok(schedule)
    }

    pub fn get_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        self.shared.store.load_schedule(id)
    }

    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        self.shared.store.list_schedules()
    }

    /// Returns whether the schedule exists.
    pub fn pause(&self, id: &str) -> Result<bool> {
        self.set_status(id, ScheduleStatus::Paused)
    }

    /// Returns whether the schedule exists.
    pub fn resume(&self, id: &str) -> Result<bool> {
        self.set_status(id, ScheduleStatus::Active)
    }

    /// Returns whether the schedule existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let deleted = {
            let _records = lock(&self.shared.records);
            self.shared.store.delete_schedule(id)?
        };
        if deleted {
            info!(id = %id, "deleted schedule");
        }
        Ok(deleted)
    }

    /// Queue an external event for the next tick.
    pub fn emit_event(&self, payload: Value) {
        debug!(event = %payload, "queued external event");
        lock(&self.shared.pending_events).push_back(payload);
    }

    /// Start a run of `id` now, subject to the concurrency cap.
    pub fn trigger_now(&self, id: &str) -> Result<TriggerOutcome> {
        let mut schedule = self
            .shared
            .store
            .load_schedule(id)?
            .ok_or_else(|| FlowError::Schedule(format!("schedule '{id}' not found")))?;
        self.shared
            .fire(&mut schedule, TriggerKind::Manual, Utc::now(), None)
    }

    pub fn list_events(&self, schedule_id: &str) -> Result<Vec<ScheduleEvent>> {
        self.shared.store.list_events(schedule_id)
    }

    pub fn active_run_count(&self) -> usize {
        lock(&self.shared.active).len()
    }

    /// Evaluate every schedule against `now` and start due runs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        self.shared.tick(now)
    }

    /// Spawn the poll loop. Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let mut running = lock(&self.running);
        if running.is_some() {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let poll = shared.config.poll_interval;

        let handle = tokio::spawn(async move {
            info!(poll_interval = ?poll, "scheduler loop started");
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = shared.tick(Utc::now());
                        if !report.started.is_empty() || !report.errors.is_empty() {
                            debug!(?report, "scheduler tick");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("scheduler loop stopped");
        });

        *running = Some(LoopHandle { shutdown, handle });
        true
    }

    /// Signal the poll loop to stop and wait for it. Runs already started
    /// keep going. Returns `false` if the loop was not running.
    pub async fn stop(&self) -> bool {
        let Some(LoopHandle { shutdown, handle }) = lock(&self.running).take() else {
            return false;
        };
        let _ = shutdown.send(true);
        if let Err(err) = handle.await {
            error!(error = %err, "scheduler loop task failed");
        }
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Wait until no scheduled run is active. Returns `false` on timeout.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.idle.notified();
            if self.active_run_count() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.active_run_count() == 0;
            }
        }
    }

    fn set_status(&self, id: &str, status: ScheduleStatus) -> Result<bool> {
        let _records = lock(&self.shared.records);
        let Some(mut schedule) = self.shared.store.load_schedule(id)? else {
            return Ok(false);
        };
        if schedule.status != status {
            schedule.status = status;
            self.shared.store.save_schedule(&schedule)?;
            info!(id = %id, status = ?status, "schedule status changed");
        }
        Ok(true)
    }
}

impl Shared {
    fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        self.collect_stale_runs();

        let mut schedules = match self.store.list_schedules() {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "failed to list schedules");
                report.errors.push(err.to_string());
                return report;
            }
        };

        for schedule in schedules.iter_mut() {
            if !schedule.is_active() || !schedule.trigger.is_time_based() {
                continue;
            }

            let due = schedule.tz().and_then(|tz| {
                let last = match schedule.trigger {
                    Trigger::Cron { .. } => schedule.last_triggered.or(Some(schedule.created_at)),
                    _ => schedule.last_triggered,
                };
                schedule.trigger.should_trigger(last, now, tz)
            });

            match due {
                Ok(true) => {
                    let kind = schedule.kind();
                    self.record_fire(schedule, kind, now, None, &mut report);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(schedule = %schedule.name, error = %err, "failed to evaluate trigger");
                    report.errors.push(format!("{}: {}", schedule.id, err));
                }
            }
        }

        let events: Vec<Value> = lock(&self.pending_events).drain(..).collect();
        for payload in events {
            for schedule in schedules.iter_mut() {
                if !schedule.is_active() {
                    continue;
                }
                if schedule
                    .trigger
                    .should_trigger_event(&payload, schedule.last_triggered, now)
                {
                    self.record_fire(
                        schedule,
                        TriggerKind::Event,
                        now,
                        Some(payload.clone()),
                        &mut report,
                    );
                }
            }
        }

        report
    }

    fn record_fire(
        self: &Arc<Self>,
        schedule: &mut Schedule,
        kind: TriggerKind,
        now: DateTime<Utc>,
        payload: Option<Value>,
        report: &mut TickReport,
    ) {
        match self.fire(schedule, kind, now, payload) {
            Ok(TriggerOutcome::Started { run_id }) => report.started.push(run_id),
            Ok(TriggerOutcome::Skipped) => report.skipped.push(schedule.id.clone()),
            Ok(TriggerOutcome::Inactive) => {
                debug!(schedule = %schedule.name, "schedule changed during tick; not firing");
            }
            Err(err) => {
                error!(schedule = %schedule.name, error = %err, "failed to start scheduled run");
                report.errors.push(format!("{}: {}", schedule.id, err));
            }
        }
    }

    /// Claim a run slot and spawn the run.
    fn fire(
        self: &Arc<Self>,
        schedule: &mut Schedule,
        kind: TriggerKind,
        now: DateTime<Utc>,
        payload: Option<Value>,
    ) -> Result<TriggerOutcome> {
        // A firing skipped by the cap is consumed, not retried on the next tick.
        if kind != TriggerKind::Manual && !self.claim_firing(schedule, now)? {
            return Ok(TriggerOutcome::Inactive);
        }

        let run_id = {
            let mut active = lock(&self.active);
            if active.len() >= self.config.max_concurrent_runs {
                warn!(
                    schedule = %schedule.name,
                    active = active.len(),
                    max = self.config.max_concurrent_runs,
                    "concurrency limit reached; skipping trigger"
                );
                return Ok(TriggerOutcome::Skipped);
            }
            let run_id = new_run_id();
            active.insert(
                run_id.clone(),
                ActiveRun {
                    schedule_id: schedule.id.clone(),
                    started: Instant::now(),
                },
            );
            run_id
        };

        let mut event = ScheduleEvent::started(schedule.id.clone(), kind, run_id.clone(), now)
            .with_metadata("schedule_name", Value::String(schedule.name.clone()))
            .with_metadata("graph_ref", Value::String(schedule.graph_ref.clone()));
        if let Some(p) = payload.as_ref() {
            event = event.with_metadata("event", p.clone());
        }
        if let Err(err) = self.store.save_event(&event) {
            self.finish_run(&run_id);
            return Err(err);
        }

        let mut config = schedule.config.clone();
        if let Some(p) = payload {
            config.insert("event".to_string(), p);
        }

        info!(
            schedule = %schedule.name,
            run_id = %run_id,
            kind = %kind,
            graph = %schedule.graph_ref,
            "starting scheduled run"
        );

        let shared = self.clone();
        let graph_ref = schedule.graph_ref.clone();
        tokio::spawn(async move {
            let outcome = match shared.registry.resolve(&graph_ref) {
                None => Err(format!("graph '{graph_ref}' is not registered")),
                Some(graph) => {
                    let ctx = PipelineContext::new(graph.name())
                        .with_run_id(event.run_id.clone())
                        .with_config(config);
                    match shared.engine.run(graph, ctx).await {
                        Ok(result) if result.success => Ok(()),
                        Ok(result) => Err(result.errors.join("; ")),
                        Err(err) => Err(err.to_string()),
                    }
                }
            };

            let terminal = match outcome {
                Ok(()) => event.finished(EventStatus::Success, None),
                Err(msg) => {
                    warn!(run_id = %event.run_id, error = %msg, "scheduled run failed");
                    event.finished(EventStatus::Failed, Some(msg))
                }
            };
            if let Err(err) = shared.store.save_event(&terminal) {
                error!(run_id = %terminal.run_id, error = %err, "failed to record run completion");
            }
            shared.finish_run(&terminal.run_id);
        });

        Ok(TriggerOutcome::Started { run_id })
    }

    /// Stamp `last_triggered` on the stored record, which may have changed
    /// since `schedule` was listed. Returns `false` if it is gone or paused.
    fn claim_firing(&self, schedule: &mut Schedule, now: DateTime<Utc>) -> Result<bool> {
        let _records = lock(&self.records);
        let Some(mut stored) = self.store.load_schedule(&schedule.id)? else {
            return Ok(false);
        };
        if !stored.is_active() {
            *schedule = stored;
            return Ok(false);
        }

        stored.last_triggered = Some(now);
        self.store.save_schedule(&stored)?;
        *schedule = stored;
        Ok(true)
    }

    fn finish_run(&self, run_id: &str) {
        let remaining = {
            let mut active = lock(&self.active);
            active.remove(run_id);
            active.len()
        };
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }

    fn collect_stale_runs(&self) {
        let timeout = self.config.run_timeout;
        let mut active = lock(&self.active);
        let before = active.len();
        active.retain(|run_id, run| {
            let stale = run.started.elapsed() > timeout;
            if stale {
                warn!(
                    run_id = %run_id,
                    schedule = %run.schedule_id,
                    "run exceeded timeout; releasing its slot"
                );
            }
            !stale
        });
        if before > 0 && active.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
