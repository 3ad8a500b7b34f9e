// src/backfill/manager.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::asset::{AssetGraph, PipelineContext, new_run_id};
use crate::backfill::generate::scheduled_instants;
use crate::backfill::model::{BackfillConfig, BackfillStatus, BackfillTask, TaskStatus};
use crate::engine::{OrchestrationEngine, RunOptions};
use crate::errors::{FlowError, Result};
use crate::schedule::{GraphRegistry, Schedule, parse_timezone};
use crate::store::StateStore;
use crate::types::OnFailure;

/// Replays a schedule over a historical range.
///
/// Tasks and their status transitions live in the [`StateStore`], so an
/// interrupted backfill can be run again and only repeats unfinished work.
#[derive(Debug, Clone)]
pub struct BackfillManager {
    store: Arc<dyn StateStore>,
    registry: Arc<dyn GraphRegistry>,
    engine: OrchestrationEngine,
}

/// Everything one task execution needs, cheap to clone into workers.
#[derive(Debug, Clone)]
struct TaskRunner {
    store: Arc<dyn StateStore>,
    engine: OrchestrationEngine,
    graph: Arc<AssetGraph>,
    config: Arc<BackfillConfig>,
    base_config: Map<String, Value>,
}

impl BackfillManager {
    pub fn new(
        store: Arc<dyn StateStore>,
        registry: Arc<dyn GraphRegistry>,
        engine: OrchestrationEngine,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
        }
    }

    /// Validate the range, generate one `Pending` task per scheduled
    /// instant and persist the backfill.
    pub fn create_backfill(&self, config: BackfillConfig) -> Result<Vec<BackfillTask>> {
        let schedule = self.schedule(&config.schedule_id)?;
        let tz_name = config.timezone.as_deref().unwrap_or(&schedule.timezone);
        let tz = parse_timezone(tz_name)?;

        let instants = scheduled_instants(&schedule.trigger, config.start, config.end, tz)?;
        let tasks: Vec<BackfillTask> = instants
            .into_iter()
            .map(|at| BackfillTask::pending(config.backfill_id.clone(), at))
            .collect();

        self.store.save_backfill(&config)?;
        for task in &tasks {
            self.store.save_backfill_task(task)?;
        }

        info!(
            backfill_id = %config.backfill_id,
            schedule = %schedule.name,
            start = %config.start,
            end = %config.end,
            tasks = tasks.len(),
            "created backfill"
        );
        Ok(tasks)
    }

    /// Execute every task that has not completed yet and return the final
    /// counts.
    pub async fn run_backfill(&self, backfill_id: &str) -> Result<BackfillStatus> {
        let config = self
            .store
            .load_backfill(backfill_id)?
            .ok_or_else(|| FlowError::Backfill(format!("backfill '{backfill_id}' not found")))?;
        let schedule = self.schedule(&config.schedule_id)?;
        let graph = self.registry.resolve(&schedule.graph_ref).ok_or_else(|| {
            FlowError::Backfill(format!("graph '{}' is not registered", schedule.graph_ref))
        })?;

        let tasks = self.store.list_backfill_tasks(backfill_id)?;
        let total = tasks.len();
        let todo: Vec<BackfillTask> = tasks
            .into_iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .collect();

        info!(
            backfill_id = %backfill_id,
            total,
            remaining = todo.len(),
            parallel = config.parallel,
            on_failure = ?config.on_failure,
            "running backfill"
        );

        let runner = TaskRunner {
            store: self.store.clone(),
            engine: self.engine.clone(),
            graph,
            base_config: schedule.config.clone(),
            config: Arc::new(config),
        };

        if runner.config.parallel {
            run_parallel(&runner, todo).await?;
        } else {
            run_sequential(&runner, todo).await?;
        }

        let status = self.get_backfill_status(backfill_id)?;
        info!(
            backfill_id = %backfill_id,
            completed = status.completed,
            failed = status.failed,
            pending = status.pending,
            "backfill finished"
        );
        Ok(status)
    }

    /// Task counts as persisted.
    pub fn get_backfill_status(&self, backfill_id: &str) -> Result<BackfillStatus> {
        if self.store.load_backfill(backfill_id)?.is_none() {
            return Err(FlowError::Backfill(format!(
                "backfill '{backfill_id}' not found"
            )));
        }
        let tasks = self.store.list_backfill_tasks(backfill_id)?;
        Ok(BackfillStatus::from_tasks(&tasks))
    }

    pub fn list_tasks(&self, backfill_id: &str) -> Result<Vec<BackfillTask>> {
        self.store.list_backfill_tasks(backfill_id)
    }

    fn schedule(&self, id: &str) -> Result<Schedule> {
        self.store
            .load_schedule(id)?
            .ok_or_else(|| FlowError::Backfill(format!("schedule '{id}' not found")))
    }
}

async fn run_sequential(runner: &TaskRunner, tasks: Vec<BackfillTask>) -> Result<()> {
    for task in tasks {
        let succeeded = runner.execute(task).await?;
        if !succeeded && runner.config.on_failure == OnFailure::FailFast {
            warn!(
                backfill_id = %runner.config.backfill_id,
                "task failed; stopping backfill and leaving remaining tasks pending"
            );
            break;
        }
    }
    Ok(())
}

async fn run_parallel(runner: &TaskRunner, tasks: Vec<BackfillTask>) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(runner.config.max_parallel.max(1)));
    let cancelled = Arc::new(AtomicBool::new(false));
    let fail_fast = runner.config.on_failure == OnFailure::FailFast;
    let mut workers = JoinSet::new();

    for task in tasks {
        let runner = runner.clone();
        let semaphore = semaphore.clone();
        let cancelled = cancelled.clone();

        workers.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| FlowError::Backfill(format!("worker pool closed: {e}")))?;
            if cancelled.load(Ordering::SeqCst) {
                debug!(task_id = %task.task_id, "backfill cancelled; task left pending");
                return Ok(());
            }
            let succeeded = runner.execute(task).await?;
            if !succeeded && fail_fast {
                cancelled.store(true, Ordering::SeqCst);
            }
            Ok::<(), FlowError>(())
        });
    }

    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        let outcome = joined.map_err(|e| FlowError::Backfill(format!("backfill worker failed: {e}")));
        if let Err(err) = outcome.and_then(|r| r) {
            error!(backfill_id = %runner.config.backfill_id, error = %err, "backfill task aborted");
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl TaskRunner {
    /// Run one task to a terminal status, re-attempting under
    /// [`OnFailure::Retry`]. Returns whether it completed.
    async fn execute(&self, mut task: BackfillTask) -> Result<bool> {
        let max_retries = match self.config.on_failure {
            OnFailure::Retry => self.config.retry_attempts,
            _ => 0,
        };

        loop {
            let run_id = new_run_id();
            task.status = TaskStatus::Running;
            task.run_id = Some(run_id.clone());
            task.started_at = Some(Utc::now());
            task.finished_at = None;
            self.store.save_backfill_task(&task)?;

            debug!(
                task_id = %task.task_id,
                scheduled_for = %task.scheduled_for,
                attempt = task.retry_count + 1,
                "running backfill task"
            );

            let outcome = self.run_graph(&task, run_id).await;
            task.finished_at = Some(Utc::now());

            match outcome {
                Ok(()) => {
                    task.status = TaskStatus::Completed;
                    task.error = None;
                    self.store.save_backfill_task(&task)?;
                    return Ok(true);
                }
                Err(msg) if task.retry_count < max_retries => {
                    warn!(
                        task_id = %task.task_id,
                        attempt = task.retry_count + 1,
                        error = %msg,
                        "backfill task failed; retrying"
                    );
                    task.retry_count += 1;
                    task.status = TaskStatus::Pending;
                    task.error = Some(msg);
                    self.store.save_backfill_task(&task)?;
                }
                Err(msg) => {
                    warn!(task_id = %task.task_id, error = %msg, "backfill task failed");
                    task.status = TaskStatus::Failed;
                    task.error = Some(msg);
                    self.store.save_backfill_task(&task)?;
                    return Ok(false);
                }
            }
        }
    }

    async fn run_graph(&self, task: &BackfillTask, run_id: String) -> std::result::Result<(), String> {
        let ctx = PipelineContext::new(self.graph.name())
            .with_run_id(run_id)
            .with_config(self.base_config.clone())
            .with_config_value(
                "scheduled_for",
                Value::String(task.scheduled_for.to_rfc3339_opts(SecondsFormat::Secs, true)),
            )
            .with_config_value("backfill_id", Value::String(task.backfill_id.clone()));

        let options = RunOptions {
            targets: Vec::new(),
            incremental: Some(false),
        };

        match self.engine.run_with(self.graph.clone(), ctx, options).await {
            Ok(result) if result.success => Ok(()),
            Ok(result) => Err(result.errors.join("; ")),
            Err(err) => Err(err.to_string()),
        }
    }
}
