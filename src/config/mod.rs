// src/config/mod.rs

//! Configuration loading and validation for assetflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it (`validate.rs`) and build runtime objects (`convert.rs`).

pub mod convert;
pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use convert::CONFIG_SCHEDULE_PREFIX;
pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    AssetConfig, ConfigFile, EngineSection, RawConfigFile, RetrySection, ScheduleConfig,
    SchedulerSection,
};
