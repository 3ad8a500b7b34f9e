// src/lib.rs

pub mod asset;
pub mod backfill;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod schedule;
pub mod store;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::asset::{AssetGraph, ExecutionResult, PipelineContext};
use crate::backfill::{BackfillConfig, BackfillManager};
use crate::checkpoint::CheckpointManager;
use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::{ExecutionEngine, OrchestrationEngine, RunOptions};
use crate::schedule::{Scheduler, StaticGraphRegistry};
use crate::store::{FileStore, StateStore};
use crate::types::OnFailure;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, then dispatches on the subcommand.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    match args.command {
        Command::Validate => print_plan(&cfg),
        Command::Run {
            targets,
            parallel,
            incremental,
            resume,
        } => {
            let result = match resume {
                Some(run_id) => resume_run(&cfg, &config_path, run_id).await?,
                None => run_once(&cfg, &config_path, targets, parallel, incremental).await?,
            };
            print_result(&result);
            if !result.success {
                bail!(
                    "run {} failed: {} of {} asset(s) failed",
                    result.run_id,
                    result.assets_failed,
                    result.assets_executed
                );
            }
            Ok(())
        }
        Command::Serve => serve(&cfg, &config_path).await,
        Command::Backfill {
            schedule,
            start,
            end,
            parallel,
            max_parallel,
            on_failure,
        } => {
            let request = BackfillRequest {
                schedule,
                start,
                end,
                parallel,
                max_parallel,
                on_failure,
            };
            backfill(&cfg, &config_path, request).await
        }
        Command::ClearState => {
            let store = open_store(&cfg, &config_path);
            let existed = store.clear_state(&cfg.pipeline)?;
            if existed {
                println!("cleared execution state of '{}'", cfg.pipeline);
            } else {
                println!("no execution state stored for '{}'", cfg.pipeline);
            }
            Ok(())
        }
    }
}

struct BackfillRequest {
    schedule: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    parallel: bool,
    max_parallel: usize,
    on_failure: OnFailure,
}

fn open_store(cfg: &ConfigFile, config_path: &Path) -> Arc<dyn StateStore> {
    let dir = cfg.state_dir(config_path);
    debug!(state_dir = %dir.display(), "using file state store");
    Arc::new(FileStore::new(dir))
}

fn orchestrator(cfg: &ConfigFile, store: Arc<dyn StateStore>) -> Result<OrchestrationEngine> {
    Ok(OrchestrationEngine::new(cfg.orchestration_config(), store).with_retry(cfg.retry_config()?))
}

async fn run_once(
    cfg: &ConfigFile,
    config_path: &Path,
    targets: Vec<String>,
    parallel: bool,
    incremental: bool,
) -> Result<ExecutionResult> {
    let graph = Arc::new(cfg.to_asset_graph()?);
    let store = open_store(cfg, config_path);
    let ctx = PipelineContext::new(graph.name());
    info!(pipeline = %graph.name(), run_id = %ctx.run_id, "starting run");

    let incremental = incremental || cfg.engine.incremental;
    if parallel || incremental {
        let mut config = cfg.orchestration_config();
        if !parallel {
            config.max_workers = 1;
        }
        let engine = OrchestrationEngine::new(config, store).with_retry(cfg.retry_config()?);
        let options = RunOptions {
            targets,
            incremental: Some(incremental),
        };
        return Ok(engine.run_with(graph, ctx, options).await?);
    }

    let mut engine = ExecutionEngine::new()
        .with_error_strategy(cfg.engine.error_strategy)
        .with_retry(cfg.retry_config()?)
        .with_checkpoints(store);
    let result =
        tokio::task::spawn_blocking(move || engine.execute(&graph, &ctx, &targets)).await??;
    Ok(result)
}

async fn resume_run(cfg: &ConfigFile, config_path: &Path, run_id: String) -> Result<ExecutionResult> {
    let graph = cfg.to_asset_graph()?;
    let store = open_store(cfg, config_path);
    let Some(state) = CheckpointManager::load(store.as_ref(), &run_id)? else {
        bail!("no checkpoints stored for run {run_id}");
    };
    info!(pipeline = %graph.name(), run_id = %run_id, "resuming run from checkpoints");

    let ctx = PipelineContext::new(graph.name()).with_run_id(run_id);
    let mut engine = ExecutionEngine::new()
        .with_error_strategy(cfg.engine.error_strategy)
        .with_retry(cfg.retry_config()?)
        .with_checkpoints(store);
    let result =
        tokio::task::spawn_blocking(move || engine.resume(&graph, &ctx, &state)).await??;
    Ok(result)
}

async fn serve(cfg: &ConfigFile, config_path: &Path) -> Result<()> {
    let store = open_store(cfg, config_path);
    let registry = Arc::new(StaticGraphRegistry::new().with_graph(cfg.to_asset_graph()?));
    let scheduler_config = cfg.scheduler_config()?;
    let drain_timeout = scheduler_config.run_timeout.min(Duration::from_secs(60));

    let scheduler = Scheduler::new(
        store.clone(),
        registry,
        orchestrator(cfg, store)?,
        scheduler_config,
    );
    for schedule in cfg.schedules()? {
        scheduler.register(schedule)?;
    }
    if cfg.schedule.is_empty() {
        warn!("no [schedule.<name>] sections; the scheduler will idle");
    }

    scheduler.start();
    info!("scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    scheduler.stop().await;

    if !scheduler.wait_for_idle(drain_timeout).await {
        warn!(
            active = scheduler.active_run_count(),
            "runs still active at shutdown"
        );
    }
    Ok(())
}

async fn backfill(cfg: &ConfigFile, config_path: &Path, request: BackfillRequest) -> Result<()> {
    let Some(declared) = cfg
        .schedules()?
        .into_iter()
        .find(|s| s.name == request.schedule)
    else {
        bail!("schedule '{}' is not declared in the config", request.schedule);
    };

    let store = open_store(cfg, config_path);
    let graph: AssetGraph = cfg.to_asset_graph()?;
    let registry = Arc::new(StaticGraphRegistry::new().with_graph(graph));

    // Keep the stored copy of the schedule in sync with the file.
    let scheduler = Scheduler::new(
        store.clone(),
        registry.clone(),
        orchestrator(cfg, store.clone())?,
        cfg.scheduler_config()?,
    );
    let schedule = scheduler.register(declared)?;

    let mut config = BackfillConfig::new(schedule.id.clone(), request.start, request.end)
        .with_on_failure(request.on_failure);
    if request.parallel {
        config = config.parallel(request.max_parallel);
    }
    let backfill_id = config.backfill_id.clone();

    let manager = BackfillManager::new(store.clone(), registry, orchestrator(cfg, store)?);
    let tasks = manager.create_backfill(config)?;
    println!("backfill {backfill_id}: {} task(s)", tasks.len());

    let status = manager.run_backfill(&backfill_id).await?;
    println!(
        "backfill {backfill_id}: {} completed, {} failed, {} pending",
        status.completed, status.failed, status.pending
    );
    if status.failed > 0 {
        bail!("backfill {backfill_id} finished with {} failed task(s)", status.failed);
    }
    Ok(())
}

/// Dry-run output: the execution plan and schedules.
fn print_plan(cfg: &ConfigFile) -> Result<()> {
    let graph = cfg.to_asset_graph()?;
    let plan = crate::dag::plan(&graph, &[])?;

    println!("assetflow plan for '{}'", graph.name());
    println!("  engine.error_strategy = {:?}", cfg.engine.error_strategy);
    println!("  engine.incremental = {}", cfg.engine.incremental);
    println!();

    println!("assets ({}), in execution order:", plan.len());
    for (i, name) in plan.order().iter().enumerate() {
        println!("  {:>3}. {name}", i + 1);
        if let Some(asset_cfg) = cfg.asset.get(name) {
            println!("       cmd: {}", asset_cfg.cmd);
        }
        let deps = graph.dependencies_of(name);
        if !deps.is_empty() {
            println!("       after: {deps:?}");
        }
    }

    let schedules = cfg.schedules()?;
    if !schedules.is_empty() {
        println!();
        println!("schedules ({}):", schedules.len());
        for schedule in schedules.iter() {
            println!(
                "  - {} ({}, {}) -> {}",
                schedule.name,
                schedule.kind(),
                schedule.timezone,
                schedule.graph_ref
            );
        }
    }

    debug!("validate complete (no execution)");
    Ok(())
}

fn print_result(result: &ExecutionResult) {
    println!(
        "run {} of '{}': {}",
        result.run_id,
        result.pipeline_id,
        if result.success { "succeeded" } else { "failed" }
    );
    println!(
        "  executed {}, succeeded {}, failed {}, skipped {}",
        result.assets_executed,
        result.assets_succeeded,
        result.assets_failed,
        result.assets_skipped.len()
    );
    for error in result.errors.iter() {
        println!("  error: {error}");
    }
}
