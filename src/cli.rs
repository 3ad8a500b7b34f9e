// src/cli.rs

//! CLI argument parsing using `clap`.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use crate::types::OnFailure;

/// Command-line arguments for `assetflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetflow",
    version,
    about = "Run, schedule and backfill data-asset pipelines.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = "Assetflow.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETFLOW_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse and validate the config, print the execution plan, run nothing.
    Validate,

    /// Run the pipeline once.
    Run {
        /// Only run these assets and their upstreams. Repeatable.
        #[arg(long = "target", value_name = "NAME")]
        targets: Vec<String>,

        /// Use the parallel orchestrator.
        #[arg(long)]
        parallel: bool,

        /// Skip assets an earlier run already completed.
        #[arg(long)]
        incremental: bool,

        /// Continue an interrupted run from its checkpoints.
        #[arg(long, value_name = "RUN_ID", conflicts_with_all = ["parallel", "incremental", "targets"])]
        resume: Option<String>,
    },

    /// Run the scheduler until Ctrl-C.
    Serve,

    /// Replay a schedule over a historical range.
    Backfill {
        /// Schedule name from the config file.
        #[arg(long, value_name = "NAME")]
        schedule: String,

        /// Inclusive range start (RFC 3339).
        #[arg(long)]
        start: DateTime<Utc>,

        /// Exclusive range end (RFC 3339).
        #[arg(long)]
        end: DateTime<Utc>,

        /// Run tasks concurrently.
        #[arg(long)]
        parallel: bool,

        #[arg(long, value_name = "N", default_value_t = 4)]
        max_parallel: usize,

        /// fail_fast, retry or continue.
        #[arg(long, value_name = "POLICY", default_value = "continue")]
        on_failure: OnFailure,
    },

    /// Forget completed assets so the next incremental run starts over.
    ClearState,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
