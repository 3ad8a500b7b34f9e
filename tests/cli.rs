// tests/cli.rs

use assetflow::cli::{CliArgs, Command, LogLevel};
use assetflow::logging::resolve_directive;
use assetflow::types::OnFailure;
use chrono::{TimeZone, Utc};
use clap::Parser;

#[test]
fn test_log_filter_precedence() {
    assert_eq!(resolve_directive(Some(LogLevel::Trace), Some("error")), "trace");
    assert_eq!(resolve_directive(None, Some(" debug ")), "debug");
    assert_eq!(
        resolve_directive(None, Some("assetflow::schedule=debug,info")),
        "assetflow::schedule=debug,info"
    );
    assert_eq!(resolve_directive(None, Some("assetflow=loudest")), "info");
    assert_eq!(resolve_directive(None, Some("")), "info");
    assert_eq!(resolve_directive(None, None), "info");
}

#[test]
fn test_run_flags_parse() {
    let args = CliArgs::try_parse_from([
        "assetflow",
        "--config",
        "pipelines/orders.toml",
        "run",
        "--parallel",
        "--target",
        "daily_totals",
        "--target",
        "raw_orders",
    ])
    .unwrap();

    assert_eq!(args.config, "pipelines/orders.toml");
    match args.command {
        Command::Run {
            targets,
            parallel,
            incremental,
            resume,
        } => {
            assert_eq!(targets, vec!["daily_totals", "raw_orders"]);
            assert!(parallel);
            assert!(!incremental);
            assert!(resume.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_resume_conflicts_with_other_run_modes() {
    assert!(CliArgs::try_parse_from(["assetflow", "run", "--resume", "r1", "--parallel"]).is_err());
    assert!(CliArgs::try_parse_from(["assetflow", "run", "--resume", "r1"]).is_ok());
}

#[test]
fn test_backfill_arguments_parse() {
    let args = CliArgs::try_parse_from([
        "assetflow",
        "backfill",
        "--schedule",
        "nightly",
        "--start",
        "2024-01-01T00:00:00Z",
        "--end",
        "2024-01-08T00:00:00Z",
        "--on-failure",
        "fail-fast",
        "--log-level",
        "debug",
    ])
    .unwrap();

    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    match args.command {
        Command::Backfill {
            schedule,
            start,
            end,
            parallel,
            max_parallel,
            on_failure,
        } => {
            assert_eq!(schedule, "nightly");
            assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
            assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap());
            assert!(!parallel);
            assert_eq!(max_parallel, 4);
            assert_eq!(on_failure, OnFailure::FailFast);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_defaults_and_bad_values() {
    let args = CliArgs::try_parse_from(["assetflow", "validate"]).unwrap();
    assert_eq!(args.config, "Assetflow.toml");
    assert!(args.log_level.is_none());

    assert!(
        CliArgs::try_parse_from([
            "assetflow",
            "backfill",
            "--schedule",
            "s",
            "--start",
            "yesterday",
            "--end",
            "2024-01-08T00:00:00Z",
        ])
        .is_err()
    );
}

#[test]
fn test_on_failure_accepts_either_separator() {
    let parse = |value: &str| {
        CliArgs::try_parse_from([
            "assetflow",
            "backfill",
            "--schedule",
            "s",
            "--start",
            "2024-01-01T00:00:00Z",
            "--end",
            "2024-01-02T00:00:00Z",
            "--on-failure",
            value,
        ])
        .map(|args| match args.command {
            Command::Backfill { on_failure, .. } => on_failure,
            other => panic!("unexpected command: {other:?}"),
        })
    };

    assert_eq!(parse("fail_fast").unwrap(), OnFailure::FailFast);
    assert_eq!(parse("Fail-Fast").unwrap(), OnFailure::FailFast);
    assert_eq!(parse("retry").unwrap(), OnFailure::Retry);
    let err = parse("abort").unwrap_err().to_string();
    assert!(err.contains("invalid on_failure: abort"), "{err}");
}
