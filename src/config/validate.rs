// src/config/validate.rs

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, ScheduleConfig};
use crate::errors::{FlowError, Result};
use crate::schedule::parse_timezone;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let cfg = ConfigFile::new_unchecked(raw);

        // Structural checks (unknown `after` entries, cycles) live with the
        // graph itself.
        cfg.to_asset_graph()?;
        cfg.schedules()?;
        Ok(cfg)
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_assets(cfg)?;
    validate_engine(cfg)?;
    validate_retry(cfg)?;
    validate_scheduler(cfg)?;
    validate_assets(cfg)?;
    for (name, schedule) in cfg.schedule.iter() {
        validate_schedule(name, schedule)?;
    }
    Ok(())
}

fn ensure_has_assets(cfg: &RawConfigFile) -> Result<()> {
    if cfg.asset.is_empty() {
        return Err(FlowError::Config(
            "config must contain at least one [asset.<name>] section".to_string(),
        ));
    }
    if cfg.pipeline.trim().is_empty() {
        return Err(FlowError::Config("`pipeline` must not be empty".to_string()));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.max_workers == Some(0) {
        return Err(FlowError::Config(
            "[engine].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.checkpoint_interval == 0 {
        return Err(FlowError::Config(
            "[engine].checkpoint_interval must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_retry(cfg: &RawConfigFile) -> Result<()> {
    let base = duration_field("[retry].base_delay", &cfg.retry.base_delay)?;
    let max = duration_field("[retry].max_delay", &cfg.retry.max_delay)?;
    if base > max {
        return Err(FlowError::Config(format!(
            "[retry].base_delay ({}) must not exceed max_delay ({})",
            cfg.retry.base_delay, cfg.retry.max_delay
        )));
    }
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let poll = duration_field("[scheduler].poll_interval", &cfg.scheduler.poll_interval)?;
    if poll.is_zero() {
        return Err(FlowError::Config(
            "[scheduler].poll_interval must be greater than zero".to_string(),
        ));
    }
    duration_field("[scheduler].run_timeout", &cfg.scheduler.run_timeout)?;
    if cfg.scheduler.max_concurrent_runs == 0 {
        return Err(FlowError::Config(
            "[scheduler].max_concurrent_runs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// Asset and schedule names end up in file names, environment values and
/// CLI flags.
const NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_-]*$";

fn validate_name(section: &str, name: &str) -> Result<()> {
    let re = Regex::new(NAME_PATTERN).map_err(|e| FlowError::Config(format!("name pattern: {e}")))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(FlowError::Config(format!(
            "[{section}.{name}]: names may only contain letters, digits, '_' and '-', and must not start with a digit or '-'"
        )))
    }
}

fn validate_assets(cfg: &RawConfigFile) -> Result<()> {
    for (name, asset) in cfg.asset.iter() {
        validate_name("asset", name)?;
        if asset.cmd.trim().is_empty() {
            return Err(FlowError::Config(format!(
                "asset '{name}' has an empty `cmd`"
            )));
        }
        if asset.uri.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(FlowError::Config(format!(
                "asset '{name}' has an empty `uri`"
            )));
        }
        if asset.after.iter().any(|dep| dep == name) {
            return Err(FlowError::Config(format!(
                "asset '{name}' cannot depend on itself in `after`"
            )));
        }
    }
    Ok(())
}

fn validate_schedule(name: &str, schedule: &ScheduleConfig) -> Result<()> {
    validate_name("schedule", name)?;

    let set = [
        schedule.cron.is_some(),
        schedule.interval.is_some(),
        schedule.event.is_some(),
    ]
    .iter()
    .filter(|s| **s)
    .count();
    if set != 1 {
        return Err(FlowError::Config(format!(
            "schedule '{name}' must set exactly one of `cron`, `interval` or `event`"
        )));
    }

    if schedule.event.is_none() && (!schedule.filters.is_empty() || schedule.min_interval.is_some()) {
        return Err(FlowError::Config(format!(
            "schedule '{name}': `filters` and `min_interval` only apply to event schedules"
        )));
    }

    parse_timezone(&schedule.timezone)
        .map_err(|e| FlowError::Config(format!("schedule '{name}': {e}")))?;
    Ok(())
}

pub(crate) fn duration_field(field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| FlowError::Config(format!("{field}: {e}")))
}
