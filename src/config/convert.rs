// src/config/convert.rs

//! Turning a validated [`ConfigFile`] into runtime objects.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::asset::{Asset, AssetGraph};
use crate::config::model::{ConfigFile, ScheduleConfig};
use crate::config::validate::duration_field;
use crate::engine::OrchestrationConfig;
use crate::errors::{FlowError, Result};
use crate::exec::{CommandOperator, RetryConfig};
use crate::schedule::{Schedule, ScheduleStatus, SchedulerConfig, Trigger};

/// Prefix of ids given to schedules declared in a config file, so that
/// reloading the file updates the stored schedule instead of adding one.
pub const CONFIG_SCHEDULE_PREFIX: &str = "config:";

impl ConfigFile {
    /// Build the pipeline graph, one shell-command asset per `[asset.<name>]`.
    pub fn to_asset_graph(&self) -> Result<AssetGraph> {
        let mut builder = AssetGraph::builder(self.pipeline.clone());
        for (name, cfg) in self.asset.iter() {
            let uri = cfg
                .uri
                .clone()
                .unwrap_or_else(|| format!("asset://{}/{}", self.pipeline, name));
            let operator = CommandOperator::new(name.clone(), cfg.cmd.clone()).into_operator(cfg.kind)?;

            let mut asset = Asset::new(name.clone(), uri)?.with_operator(operator);
            if let Some(asset_type) = cfg.asset_type.as_deref() {
                asset = asset.with_type(asset_type);
            }
            for (key, value) in cfg.metadata.iter() {
                asset = asset.with_metadata(key.clone(), value.clone());
            }

            let deps: Vec<&str> = cfg.after.iter().map(String::as_str).collect();
            builder = builder.asset_after(asset, &deps);
        }
        builder.build()
    }

    pub fn orchestration_config(&self) -> OrchestrationConfig {
        let defaults = OrchestrationConfig::default();
        OrchestrationConfig {
            max_workers: self.engine.max_workers.unwrap_or(defaults.max_workers),
            error_strategy: self.engine.error_strategy,
            incremental: self.engine.incremental,
            checkpoint_interval: self.engine.checkpoint_interval,
        }
    }

    pub fn retry_config(&self) -> Result<RetryConfig> {
        Ok(RetryConfig::default()
            .with_max_retries(self.retry.max_retries)
            .with_backoff(self.retry.backoff)
            .with_base_delay(duration_field("[retry].base_delay", &self.retry.base_delay)?)
            .with_max_delay(duration_field("[retry].max_delay", &self.retry.max_delay)?)
            .with_jitter(self.retry.jitter)
            .with_retry_on(self.retry.retry_on))
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        Ok(SchedulerConfig {
            poll_interval: duration_field("[scheduler].poll_interval", &self.scheduler.poll_interval)?,
            max_concurrent_runs: self.scheduler.max_concurrent_runs,
            run_timeout: duration_field("[scheduler].run_timeout", &self.scheduler.run_timeout)?,
        })
    }

    /// Schedules declared in the file, with stable `config:<name>` ids.
    pub fn schedules(&self) -> Result<Vec<Schedule>> {
        self.schedule
            .iter()
            .map(|(name, cfg)| self.build_schedule(name, cfg))
            .collect()
    }

    /// State directory, resolved against the directory holding the config
    /// file when relative.
    pub fn state_dir(&self, config_path: &Path) -> PathBuf {
        let dir = PathBuf::from(&self.engine.state_dir);
        if dir.is_absolute() {
            return dir;
        }
        match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(dir),
            _ => dir,
        }
    }

    fn build_schedule(&self, name: &str, cfg: &ScheduleConfig) -> Result<Schedule> {
        let field = |key: &str| format!("[schedule.{name}].{key}");

        let trigger = if let Some(expr) = cfg.cron.as_deref() {
            Trigger::cron(expr)
        } else if let Some(interval) = cfg.interval.as_deref() {
            let secs = duration_field(&field("interval"), interval)?.as_secs();
            Trigger::interval(secs)
        } else if let Some(event_type) = cfg.event.as_deref() {
            let mut trigger = Trigger::event(event_type);
            for (key, value) in cfg.filters.iter() {
                trigger = trigger.with_filter(key.clone(), value.clone());
            }
            if let Some(min) = cfg.min_interval.as_deref() {
                trigger = trigger.with_min_interval(duration_field(&field("min_interval"), min)?.as_secs());
            }
            trigger
        } else {
            return Err(FlowError::Config(format!(
                "schedule '{name}' has no trigger"
            )));
        };
        trigger
            .validate()
            .map_err(|e| FlowError::Config(format!("schedule '{name}': {e}")))?;

        let graph = cfg.graph.clone().unwrap_or_else(|| self.pipeline.clone());
        let mut schedule = Schedule::new(name, trigger, graph, cfg.timezone.clone(), Utc::now())
            .with_id(format!("{CONFIG_SCHEDULE_PREFIX}{name}"))
            .with_config(cfg.config.clone());
        if cfg.paused {
            schedule.status = ScheduleStatus::Paused;
        }
        Ok(schedule)
    }
}
