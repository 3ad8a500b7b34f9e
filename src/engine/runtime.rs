// src/engine/runtime.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::asset::{
    AssetGraph, AssetName, AssetResult, ExecutionResult, PipelineContext, UpstreamResults,
};
use crate::checkpoint::CheckpointManager;
use crate::dag::{DagGraph, RunTracker, plan};
use crate::engine::core::{OrchestratorCore, OrchestratorEvent};
use crate::engine::event_handlers::{CoreCommand, CoreStep};
use crate::engine::state::ExecutionState;
use crate::errors::{FlowError, Result};
use crate::exec::{Executor, RetryConfig};
use crate::store::StateStore;
use crate::types::ErrorStrategy;

/// Settings of the parallel orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationConfig {
    /// Upper bound on assets executing at once.
    pub max_workers: usize,
    pub error_strategy: ErrorStrategy,
    /// Skip assets that an earlier run already completed.
    pub incremental: bool,
    /// Persist state every N completed assets (and always at the end).
    pub checkpoint_interval: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            error_strategy: ErrorStrategy::FailFast,
            incremental: false,
            checkpoint_interval: 1,
        }
    }
}

/// Per-invocation overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the run to these assets and their upstreams.
    pub targets: Vec<AssetName>,
    /// Override [`OrchestrationConfig::incremental`].
    pub incremental: Option<bool>,
}

/// Runs a graph on a bounded pool of blocking workers.
///
/// This is the IO shell around [`OrchestratorCore`]: it spawns workers for
/// dispatched assets, feeds their outcomes back into the core, keeps the
/// persisted [`ExecutionState`] current and assembles the final
/// [`ExecutionResult`].
#[derive(Debug, Clone)]
pub struct OrchestrationEngine {
    config: OrchestrationConfig,
    executor: Executor,
    retry: RetryConfig,
    store: Arc<dyn StateStore>,
}

/// Mutable bookkeeping of one run inside the shell.
struct RunContext {
    graph: Arc<AssetGraph>,
    ctx: PipelineContext,
    available: HashMap<AssetName, AssetResult>,
    workers: JoinSet<()>,
    tx: mpsc::Sender<AssetResult>,
}

impl OrchestrationEngine {
    pub fn new(config: OrchestrationConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            config,
            executor: Executor::new(),
            retry: RetryConfig::none(),
            store,
        }
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub async fn run(&self, graph: Arc<AssetGraph>, ctx: PipelineContext) -> Result<ExecutionResult> {
        self.run_with(graph, ctx, RunOptions::default()).await
    }

    /// Execute a graph.
    ///
    /// Structural errors and persistence failures are returned as errors;
    /// asset failures are reported inside the result.
    pub async fn run_with(
        &self,
        graph: Arc<AssetGraph>,
        ctx: PipelineContext,
        options: RunOptions,
    ) -> Result<ExecutionResult> {
        let clock = Instant::now();
        let plan = plan(&graph, &options.targets)?;
        let pipeline = graph.name().to_string();
        let incremental = options.incremental.unwrap_or(self.config.incremental);
        let interval = self.config.checkpoint_interval.max(1);

        // Full runs still extend the stored state; only skipping is gated.
        let state = match self.store.load_state(&pipeline)? {
            Some(previous) => previous.continue_as(ctx.run_id.clone()),
            None => ExecutionState::new(pipeline.clone(), ctx.run_id.clone()),
        };

        let skipped: Vec<AssetName> = if incremental {
            plan.order()
                .iter()
                .filter(|name| state.is_completed(name))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let skipped_set: HashSet<AssetName> = skipped.iter().cloned().collect();

        info!(
            pipeline = %pipeline,
            run_id = %ctx.run_id,
            assets = plan.len(),
            skipped = skipped.len(),
            max_workers = self.config.max_workers,
            strategy = ?self.config.error_strategy,
            incremental,
            "starting orchestrated run"
        );

        let state = Mutex::new(state);
        let checkpoints =
            CheckpointManager::new(self.store.clone(), pipeline.clone(), ctx.run_id.clone());

        let tracker = RunTracker::new(
            DagGraph::from_asset_graph(&graph),
            &plan,
            &skipped_set,
            self.config.error_strategy,
        );
        let mut core = OrchestratorCore::new(tracker, self.config.max_workers);

        let (tx, mut rx) = mpsc::channel::<AssetResult>(self.config.max_workers.max(1));
        let mut run = RunContext {
            graph: graph.clone(),
            ctx: ctx.clone(),
            available: HashMap::new(),
            workers: JoinSet::new(),
            tx,
        };

        let mut result = ExecutionResult::new(pipeline.clone(), ctx.run_id.clone());
        result.assets_skipped = skipped;

        let mut store_error: Option<FlowError> = None;
        let mut since_persist = 0usize;

        let mut step = core.start();
        loop {
            if !self.apply(step, &mut run) {
                break;
            }

            let Some(outcome) = rx.recv().await else {
                error!(pipeline = %pipeline, "worker channel closed with assets in flight");
                break;
            };

            let name = outcome.asset_name.clone();
            let success = outcome.success;
            {
                let mut state = lock(&state);
                if success {
                    state.mark_completed(&name);
                } else {
                    state.mark_failed(&name);
                }
            }
            checkpoints.buffer(&outcome);
            run.available.insert(name.clone(), outcome.clone());
            result.record(outcome);

            // Persist before the core sees the completion: a halt must land
            // first so the completion cannot release dependents.
            let mut halt = None;
            if store_error.is_none() {
                since_persist += 1;
                if since_persist >= interval {
                    since_persist = 0;
                    if let Err(err) = self.persist(&state, &checkpoints) {
                        warn!(pipeline = %pipeline, error = %err, "failed to persist state; halting run");
                        store_error = Some(err);
                        halt = Some(core.step(OrchestratorEvent::HaltRequested));
                    }
                }
            }

            let completed = core.step(OrchestratorEvent::AssetCompleted {
                asset: name,
                success,
            });
            step = match halt {
                Some(halt) => merge_halt(halt, completed),
                None => completed,
            };
        }

        // Join all outstanding work before assembling the result.
        while let Some(joined) = run.workers.join_next().await {
            if let Err(err) = joined {
                error!(pipeline = %pipeline, error = %err, "worker task failed to join");
            }
        }

        if let Some(err) = store_error {
            return Err(err);
        }
        self.persist(&state, &checkpoints)?;

        result.finalize(clock.elapsed());
        info!(
            pipeline = %pipeline,
            run_id = %ctx.run_id,
            success = result.success,
            executed = result.assets_executed,
            failed = result.assets_failed,
            skipped = result.assets_skipped.len(),
            "orchestrated run finished"
        );
        Ok(result)
    }

    /// Forget which assets completed, so the next incremental run executes
    /// everything. Returns whether a state existed.
    pub fn clear_state(&self, pipeline: &str) -> Result<bool> {
        let existed = self.store.clear_state(pipeline)?;
        info!(pipeline = %pipeline, existed, "cleared execution state");
        Ok(existed)
    }

    pub fn load_state(&self, pipeline: &str) -> Result<Option<ExecutionState>> {
        self.store.load_state(pipeline)
    }

    /// Execute the core's commands. Returns whether the run continues.
    fn apply(&self, step: CoreStep, run: &mut RunContext) -> bool {
        for command in step.commands {
            match command {
                CoreCommand::Dispatch(names) => {
                    for name in names {
                        self.spawn_worker(run, name);
                    }
                }
                CoreCommand::Finish => {
                    debug!("core reported run finished");
                }
            }
        }
        step.keep_running
    }

    fn spawn_worker(&self, run: &mut RunContext, name: AssetName) {
        let upstream: UpstreamResults = run
            .graph
            .dependencies_of(&name)
            .iter()
            .filter_map(|dep| run.available.get(dep).cloned())
            .collect();

        let graph = run.graph.clone();
        let ctx = run.ctx.clone();
        let executor = self.executor.clone();
        let retry = self.retry.clone();
        let tx = run.tx.clone();

        debug!(asset = %name, "dispatching asset to worker");

        run.workers.spawn(async move {
            let asset_name = name.clone();
            let joined = tokio::task::spawn_blocking(move || match graph.asset(&name) {
                Some(asset) => executor.execute_with_retry(asset, &ctx, &upstream, &retry),
                None => AssetResult::failure(name.clone(), format!("asset '{name}' not found"), Vec::new()),
            })
            .await;

            let outcome = joined.unwrap_or_else(|err| {
                AssetResult::failure(asset_name.clone(), format!("worker failed: {err}"), Vec::new())
            });

            if tx.send(outcome).await.is_err() {
                warn!(asset = %asset_name, "orchestrator stopped listening; dropping outcome");
            }
        });
    }

    fn persist(&self, state: &Mutex<ExecutionState>, checkpoints: &CheckpointManager) -> Result<()> {
        let snapshot = lock(state).clone();
        self.store.save_state(&snapshot)?;
        checkpoints.flush()
    }
}

/// Combine a halt with the step that follows it. Nothing is dispatched
/// once a halt has been requested.
fn merge_halt(mut halt: CoreStep, next: CoreStep) -> CoreStep {
    halt.commands.retain(|c| *c == CoreCommand::Finish);
    halt.commands.extend(
        next.commands
            .into_iter()
            .filter(|c| !matches!(c, CoreCommand::Dispatch(_))),
    );
    halt.keep_running = next.keep_running;
    halt
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
