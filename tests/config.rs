// tests/config.rs

use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use assetflow::asset::OperatorKind;
use assetflow::config::{ConfigFile, load_and_validate, load_from_str, parse_duration};
use assetflow::errors::FlowError;
use assetflow::schedule::{ScheduleStatus, Trigger};
use assetflow::types::{BackoffStrategy, ErrorStrategy};
use assetflow_test_utils::builders::{AssetConfigBuilder, ConfigFileBuilder, ScheduleConfigBuilder};
use serde_json::json;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const FULL_CONFIG: &str = r#"
pipeline = "orders"

[engine]
max_workers = 3
error_strategy = "continue"
incremental = true
checkpoint_interval = 2
state_dir = "state"

[retry]
max_retries = 2
backoff = "linear"
base_delay = "250ms"
max_delay = "5s"

[scheduler]
poll_interval = "500ms"
max_concurrent_runs = 2
run_timeout = "30m"

[asset.raw_orders]
cmd = "echo '[1, 2, 3]'"
kind = "source"
type = "file"

[asset.daily_totals]
cmd = "jq '.raw_orders | length'"
after = ["raw_orders"]
uri = "warehouse://totals"

[asset.daily_totals.metadata]
owner = "finance"

[schedule.nightly]
cron = "0 0 2 * * *"
timezone = "Europe/Oslo"

[schedule.nightly.config]
region = "eu"

[schedule.on_upload]
event = "file_uploaded"
filters = { bucket = "raw" }
min_interval = "1m"
paused = true
"#;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("Assetflow.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_full_config_loads_and_converts() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, FULL_CONFIG);
    let cfg = load_and_validate(&path)?;

    let orch = cfg.orchestration_config();
    assert_eq!(orch.max_workers, 3);
    assert_eq!(orch.error_strategy, ErrorStrategy::Continue);
    assert!(orch.incremental);
    assert_eq!(orch.checkpoint_interval, 2);

    let retry = cfg.retry_config()?;
    assert_eq!(retry.max_retries, 2);
    assert_eq!(retry.backoff, BackoffStrategy::Linear);
    assert_eq!(retry.base_delay_for(1), Duration::from_millis(500));

    let sched = cfg.scheduler_config()?;
    assert_eq!(sched.poll_interval, Duration::from_millis(500));
    assert_eq!(sched.max_concurrent_runs, 2);
    assert_eq!(sched.run_timeout, Duration::from_secs(1800));

    assert_eq!(cfg.state_dir(&path), dir.path().join("state"));
    Ok(())
}

#[test]
fn test_assets_become_a_graph_in_declaration_order() -> TestResult {
    let dir = TempDir::new()?;
    let cfg = load_and_validate(write_config(&dir, FULL_CONFIG))?;
    let graph = cfg.to_asset_graph()?;

    assert_eq!(graph.name(), "orders");
    let names: Vec<&str> = graph.asset_names().collect();
    assert_eq!(names, vec!["raw_orders", "daily_totals"]);

    let raw = graph.asset("raw_orders").unwrap();
    assert_eq!(raw.uri, "asset://orders/raw_orders");
    assert_eq!(raw.asset_type, "file");
    assert_eq!(raw.operator.as_ref().unwrap().kind(), OperatorKind::Source);

    let totals = graph.asset("daily_totals").unwrap();
    assert_eq!(totals.uri, "warehouse://totals");
    assert_eq!(totals.metadata["owner"], "finance");
    assert_eq!(graph.dependencies_of("daily_totals"), ["raw_orders".to_string()]);
    Ok(())
}

#[test]
fn test_schedules_get_stable_ids_and_triggers() -> TestResult {
    let dir = TempDir::new()?;
    let cfg = load_and_validate(write_config(&dir, FULL_CONFIG))?;
    let schedules = cfg.schedules()?;

    let nightly = &schedules[0];
    assert_eq!(nightly.id, "config:nightly");
    assert_eq!(nightly.graph_ref, "orders");
    assert_eq!(nightly.timezone, "Europe/Oslo");
    assert_eq!(nightly.trigger, Trigger::cron("0 0 2 * * *"));
    assert_eq!(nightly.config["region"], json!("eu"));
    assert!(nightly.is_active());

    let upload = &schedules[1];
    assert_eq!(
        upload.trigger,
        Trigger::event("file_uploaded")
            .with_filter("bucket", json!("raw"))
            .with_min_interval(60)
    );
    assert_eq!(upload.status, ScheduleStatus::Paused);
    Ok(())
}

#[test]
fn test_minimal_config_uses_defaults() -> TestResult {
    let raw = load_from_str("[asset.only]\ncmd = \"true\"\n")?;
    let cfg = ConfigFile::try_from(raw)?;

    assert_eq!(cfg.pipeline, "default");
    assert_eq!(cfg.engine.error_strategy, ErrorStrategy::FailFast);
    assert_eq!(cfg.scheduler_config()?.max_concurrent_runs, 4);
    assert_eq!(cfg.retry_config()?.max_retries, 0);
    assert!(cfg.schedules()?.is_empty());
    assert_eq!(
        cfg.state_dir(Path::new("Assetflow.toml")),
        Path::new(".assetflow")
    );
    Ok(())
}

#[test]
fn test_interval_schedule_from_builder() -> TestResult {
    let cfg = ConfigFileBuilder::new("p")
        .with_asset("a", AssetConfigBuilder::new("true").build())
        .with_schedule("every", ScheduleConfigBuilder::interval("15m").graph("other").build())
        .build();

    let schedule = &cfg.schedules()?[0];
    assert_eq!(schedule.trigger, Trigger::interval(900));
    assert_eq!(schedule.graph_ref, "other");
    Ok(())
}

fn config_error(builder: ConfigFileBuilder) -> FlowError {
    builder.try_build().unwrap_err()
}

#[test]
fn test_rejects_empty_and_malformed_configs() {
    let err = ConfigFile::try_from(load_from_str("pipeline = \"p\"").unwrap()).unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));

    let err = load_from_str("[asset.a\ncmd = 1").unwrap_err();
    assert!(matches!(err, FlowError::Toml(_)));

    let err = config_error(
        ConfigFileBuilder::new("p").with_asset("a", AssetConfigBuilder::new("  ").build()),
    );
    assert!(err.to_string().contains("empty `cmd`"));

    let err = config_error(
        ConfigFileBuilder::new("p")
            .with_asset("a", AssetConfigBuilder::new("true").build())
            .max_workers(0),
    );
    assert!(err.to_string().contains("max_workers"));
}

#[test]
fn test_rejects_broken_dependencies() {
    let err = config_error(
        ConfigFileBuilder::new("p").with_asset("a", AssetConfigBuilder::new("true").after("a").build()),
    );
    assert!(matches!(err, FlowError::Config(_)));

    let err = config_error(
        ConfigFileBuilder::new("p").with_asset("a", AssetConfigBuilder::new("true").after("ghost").build()),
    );
    assert!(matches!(err, FlowError::UnknownDependency { .. }));

    let err = config_error(
        ConfigFileBuilder::new("p")
            .with_asset("a", AssetConfigBuilder::new("true").after("b").build())
            .with_asset("b", AssetConfigBuilder::new("true").after("a").build()),
    );
    assert!(matches!(err, FlowError::Cycle { .. }));
}

#[test]
fn test_rejects_bad_schedules() {
    let asset = || AssetConfigBuilder::new("true").build();

    let mut both = ScheduleConfigBuilder::cron("0 * * * * *").build();
    both.interval = Some("1m".into());
    let err = config_error(ConfigFileBuilder::new("p").with_asset("a", asset()).with_schedule("s", both));
    assert!(err.to_string().contains("exactly one"));

    let err = config_error(
        ConfigFileBuilder::new("p")
            .with_asset("a", asset())
            .with_schedule("s", ScheduleConfigBuilder::cron("nonsense").build()),
    );
    assert!(matches!(err, FlowError::Config(_)));

    let err = config_error(
        ConfigFileBuilder::new("p")
            .with_asset("a", asset())
            .with_schedule("s", ScheduleConfigBuilder::interval("1h").timezone("Moon/Base").build()),
    );
    assert!(err.to_string().contains("timezone"));

    let err = config_error(
        ConfigFileBuilder::new("p")
            .with_asset("a", asset())
            .with_schedule("s", ScheduleConfigBuilder::interval("1h").filter("k", json!(1)).build()),
    );
    assert!(err.to_string().contains("event schedules"));

    let err = config_error(
        ConfigFileBuilder::new("p")
            .with_asset("a", asset())
            .with_schedule("s", ScheduleConfigBuilder::interval("0s").build()),
    );
    assert!(matches!(err, FlowError::Config(_)));
}

#[test]
fn test_rejects_inverted_retry_delays() -> TestResult {
    let mut raw = ConfigFileBuilder::new("p")
        .with_asset("a", AssetConfigBuilder::new("true").build())
        .raw();
    raw.retry.base_delay = "10s".into();
    raw.retry.max_delay = "1s".into();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(err.to_string().contains("base_delay"));
    Ok(())
}

#[test]
fn test_parse_duration_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert_eq!(parse_duration("1d"), Ok(Duration::from_secs(86_400)));

    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5w").is_err());
    assert!(parse_duration("99999999999999999999h").is_err());
}

#[test]
fn test_rejects_names_unsafe_for_files_and_flags() {
    for bad in ["9lives", "with space", "dots.are.out", "-dash"] {
        let err = config_error(
            ConfigFileBuilder::new("p").with_asset(bad, AssetConfigBuilder::new("true").build()),
        );
        assert!(err.to_string().contains("names may only contain"), "{bad}: {err}");
    }

    let err = config_error(
        ConfigFileBuilder::new("p")
            .with_asset("ok-name_2", AssetConfigBuilder::new("true").build())
            .with_schedule("every day", ScheduleConfigBuilder::interval("1d").build()),
    );
    assert!(err.to_string().contains("[schedule.every day]"));
}
