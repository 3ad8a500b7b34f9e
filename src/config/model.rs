// src/config/model.rs

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::asset::OperatorKind;
use crate::types::{BackoffStrategy, ErrorStrategy, JitterStrategy, RetryOn};

/// Pipeline configuration as read from a TOML file, before validation.
///
/// ```toml
/// pipeline = "orders"
///
/// [engine]
/// max_workers = 4
/// error_strategy = "continue"
///
/// [asset.raw_orders]
/// cmd = "cat data/orders.json"
/// kind = "source"
///
/// [asset.daily_totals]
/// cmd = "jq '.raw_orders | length'"
/// after = ["raw_orders"]
///
/// [schedule.nightly]
/// cron = "0 0 2 * * *"
/// ```
///
/// All sections are optional and have reasonable defaults; assets keep the
/// order they are declared in.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Graph name; schedules without `graph` run this pipeline.
    #[serde(default = "default_pipeline")]
    pub pipeline: String,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Assets from `[asset.<name>]`, in declaration order.
    #[serde(default)]
    pub asset: IndexMap<String, AssetConfig>,

    /// Schedules from `[schedule.<name>]`.
    #[serde(default)]
    pub schedule: IndexMap<String, ScheduleConfig>,
}

fn default_pipeline() -> String {
    "default".to_string()
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            engine: EngineSection::default(),
            retry: RetrySection::default(),
            scheduler: SchedulerSection::default(),
            asset: IndexMap::new(),
            schedule: IndexMap::new(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Defaults to the number of available CPUs.
    #[serde(default)]
    pub max_workers: Option<usize>,

    #[serde(default)]
    pub error_strategy: ErrorStrategy,

    #[serde(default)]
    pub incremental: bool,

    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Directory of the file-backed state store, relative to the config file.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_checkpoint_interval() -> usize {
    1
}

fn default_state_dir() -> String {
    crate::store::file::DEFAULT_STATE_DIR.to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_workers: None,
            error_strategy: ErrorStrategy::default(),
            incremental: false,
            checkpoint_interval: default_checkpoint_interval(),
            state_dir: default_state_dir(),
        }
    }
}

/// `[retry]` section, applied to every asset.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Duration string such as `"1s"` or `"250ms"`.
    #[serde(default = "default_base_delay")]
    pub base_delay: String,

    #[serde(default = "default_max_delay")]
    pub max_delay: String,

    #[serde(default)]
    pub jitter: JitterStrategy,

    #[serde(default)]
    pub retry_on: RetryOn,
}

fn default_base_delay() -> String {
    "1s".to_string()
}

fn default_max_delay() -> String {
    "60s".to_string()
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffStrategy::default(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: JitterStrategy::default(),
            retry_on: RetryOn::default(),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    #[serde(default = "default_run_timeout")]
    pub run_timeout: String,
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_run_timeout() -> String {
    "1h".to_string()
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_concurrent_runs: default_max_concurrent_runs(),
            run_timeout: default_run_timeout(),
        }
    }
}

/// `[asset.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    /// Shell command producing the asset's data on stdout.
    pub cmd: String,

    /// Defaults to `asset://<pipeline>/<name>`.
    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub kind: OperatorKind,

    /// Free-form asset type tag (`"table"` when omitted).
    #[serde(default, rename = "type")]
    pub asset_type: Option<String>,

    /// Assets this one reads from.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// `[schedule.<name>]` section. Exactly one of `cron`, `interval` and
/// `event` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub cron: Option<String>,

    /// Duration string such as `"15m"`.
    #[serde(default)]
    pub interval: Option<String>,

    /// Event type to match against the payload's `type` field.
    #[serde(default)]
    pub event: Option<String>,

    /// Payload fields that must equal these values (event schedules only).
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,

    /// Debounce window for event schedules.
    #[serde(default)]
    pub min_interval: Option<String>,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Pipeline to run; defaults to the file's own `pipeline`.
    #[serde(default)]
    pub graph: Option<String>,

    /// Start out paused.
    #[serde(default)]
    pub paused: bool,

    /// Passed to every run as context config.
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// A validated configuration. Build one with
/// [`load_and_validate`](crate::config::load_and_validate) or
/// `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: String,
    pub engine: EngineSection,
    pub retry: RetrySection,
    pub scheduler: SchedulerSection,
    pub asset: IndexMap<String, AssetConfig>,
    pub schedule: IndexMap<String, ScheduleConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            pipeline: raw.pipeline,
            engine: raw.engine,
            retry: raw.retry,
            scheduler: raw.scheduler,
            asset: raw.asset,
            schedule: raw.schedule,
        }
    }
}
