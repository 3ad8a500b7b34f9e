// src/engine/execution.rs

//! Single-threaded, dependency-ordered execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::asset::{
    AssetGraph, AssetName, AssetResult, ExecutionResult, IoManager, PipelineContext,
    UpstreamResults,
};
use crate::checkpoint::{CheckpointManager, CheckpointState};
use crate::dag::{ExecutionPlan, plan};
use crate::errors::{FlowError, Result};
use crate::exec::{Executor, RetryConfig};
use crate::store::StateStore;
use crate::types::ErrorStrategy;

/// Lifecycle of one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Planning,
    Running,
    Succeeded,
    Failed,
}

/// Runs assets one at a time in topological order.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    executor: Executor,
    error_strategy: ErrorStrategy,
    retry: RetryConfig,
    checkpoint_store: Option<Arc<dyn StateStore>>,
    phase: RunPhase,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self {
            executor: Executor::new(),
            error_strategy: ErrorStrategy::FailFast,
            retry: RetryConfig::none(),
            checkpoint_store: None,
            phase: RunPhase::Idle,
        }
    }

    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Record a checkpoint after every successful asset.
    pub fn with_checkpoints(mut self, store: Arc<dyn StateStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    pub fn with_io_manager(mut self, io_manager: Arc<dyn IoManager>) -> Self {
        self.executor = self.executor.with_io_manager(io_manager);
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn error_strategy(&self) -> ErrorStrategy {
        self.error_strategy
    }

    /// Phase of the most recent invocation.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Validate `graph` and compute the execution order without running
    /// anything.
    pub fn plan(&self, graph: &AssetGraph, targets: &[AssetName]) -> Result<ExecutionPlan> {
        plan(graph, targets)
    }

    /// Execute `graph`, or only `targets` and their upstreams when
    /// `targets` is non-empty.
    ///
    /// Structural problems are returned as errors before any asset runs;
    /// asset failures are reported inside the [`ExecutionResult`].
    pub fn execute(
        &mut self,
        graph: &AssetGraph,
        ctx: &PipelineContext,
        targets: &[AssetName],
    ) -> Result<ExecutionResult> {
        self.phase = RunPhase::Planning;
        let plan = match plan(graph, targets) {
            Ok(plan) => plan,
            Err(err) => {
                self.phase = RunPhase::Failed;
                return Err(err);
            }
        };

        info!(
            pipeline = %graph.name(),
            run_id = %ctx.run_id,
            assets = plan.len(),
            strategy = ?self.error_strategy,
            "starting pipeline run"
        );

        let checkpoints = self
            .checkpoint_store
            .clone()
            .map(|store| CheckpointManager::new(store, graph.name(), ctx.run_id.clone()));

        self.run_order(graph, ctx, plan.order(), HashMap::new(), checkpoints.as_ref())
    }

    /// Continue an interrupted run from its checkpoints.
    ///
    /// Only assets without a checkpoint, and their dependents, execute;
    /// checkpointed results are handed to them as upstream inputs and are
    /// not counted as executed. The run keeps the checkpointed run id.
    pub fn resume(
        &mut self,
        graph: &AssetGraph,
        ctx: &PipelineContext,
        state: &CheckpointState,
    ) -> Result<ExecutionResult> {
        self.phase = RunPhase::Planning;
        let planned = plan(graph, &[]).and_then(|p| {
            let remaining = state.resume_point(graph, p.order())?;
            Ok((p, remaining))
        });
        let (full, remaining) = match planned {
            Ok(v) => v,
            Err(err) => {
                self.phase = RunPhase::Failed;
                return Err(err);
            }
        };

        info!(
            pipeline = %graph.name(),
            run_id = %state.run_id,
            checkpointed = state.checkpoints.len(),
            remaining = remaining.len(),
            total = full.len(),
            "resuming pipeline run from checkpoint"
        );

        let ctx = ctx.clone().with_run_id(state.run_id.clone());
        let checkpoints = self
            .checkpoint_store
            .clone()
            .map(|store| CheckpointManager::resume(store, state.clone()));

        self.run_order(graph, &ctx, &remaining, state.results(), checkpoints.as_ref())
    }

    fn run_order(
        &mut self,
        graph: &AssetGraph,
        ctx: &PipelineContext,
        order: &[AssetName],
        prior: HashMap<AssetName, AssetResult>,
        checkpoints: Option<&CheckpointManager>,
    ) -> Result<ExecutionResult> {
        let clock = Instant::now();
        let mut result = ExecutionResult::new(graph.name(), ctx.run_id.clone());
        let mut available = prior;

        self.phase = RunPhase::Running;

        for name in order {
            let asset = graph
                .asset(name)
                .ok_or_else(|| FlowError::AssetNotFound(name.clone()))?;

            let upstream: UpstreamResults = graph
                .dependencies_of(name)
                .iter()
                .filter_map(|dep| available.get(dep).cloned())
                .collect();

            let outcome =
                self.executor
                    .execute_with_retry(asset, ctx, &upstream, &self.retry);

            if let Some(manager) = checkpoints {
                if let Err(err) = manager.record(&outcome) {
                    warn!(asset = %name, error = %err, "failed to persist checkpoint; aborting run");
                    self.phase = RunPhase::Failed;
                    return Err(err);
                }
            }

            let failed = !outcome.success;
            available.insert(name.clone(), outcome.clone());
            result.record(outcome);

            if failed && self.error_strategy == ErrorStrategy::FailFast {
                warn!(asset = %name, "asset failed; stopping run (fail_fast)");
                break;
            }
        }

        result.finalize(clock.elapsed());
        self.phase = if result.success {
            RunPhase::Succeeded
        } else {
            RunPhase::Failed
        };

        debug!(
            pipeline = %graph.name(),
            executed = result.assets_executed,
            failed = result.assets_failed,
            "pipeline run finished"
        );

        Ok(result)
    }
}
