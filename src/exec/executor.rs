// src/exec/executor.rs

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::asset::{Asset, AssetResult, IoManager, PipelineContext, UpstreamResults};
use crate::exec::retry::{RetryConfig, retry};

/// Runs a single asset's operator and turns the outcome into an
/// [`AssetResult`].
///
/// Operator failures and panics never escape: they become failed results.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    io_manager: Option<Arc<dyn IoManager>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand every successful output to `io_manager`.
    pub fn with_io_manager(mut self, io_manager: Arc<dyn IoManager>) -> Self {
        self.io_manager = Some(io_manager);
        self
    }

    pub fn io_manager(&self) -> Option<&Arc<dyn IoManager>> {
        self.io_manager.as_ref()
    }

    /// Execute `asset` once.
    ///
    /// `upstream` holds the results of the asset's direct dependencies in
    /// declaration order; its names become the result's lineage.
    pub fn execute(
        &self,
        asset: &Asset,
        ctx: &PipelineContext,
        upstream: &UpstreamResults,
    ) -> AssetResult {
        self.execute_with_retry(asset, ctx, upstream, &RetryConfig::none())
    }

    /// Execute `asset`, re-attempting failures according to `retry_config`.
    pub fn execute_with_retry(
        &self,
        asset: &Asset,
        ctx: &PipelineContext,
        upstream: &UpstreamResults,
        retry_config: &RetryConfig,
    ) -> AssetResult {
        let lineage = upstream.names();
        let started_at = Utc::now();
        let clock = Instant::now();

        debug!(asset = %asset.name, run_id = %ctx.run_id, "executing asset");

        let outcome = retry(retry_config, |attempt| {
            if attempt > 0 {
                info!(asset = %asset.name, attempt = attempt + 1, "retrying asset");
            }
            self.run_once(asset, ctx, upstream)
        });

        let duration = clock.elapsed();
        let finished_at = Utc::now();

        match outcome {
            Ok((data, attempts)) => {
                debug!(
                    asset = %asset.name,
                    attempts,
                    elapsed_ms = duration.as_millis() as u64,
                    "asset succeeded"
                );
                AssetResult::success(asset.name.clone(), data, lineage)
                    .with_timing(started_at, finished_at, duration)
                    .with_attempts(attempts)
            }
            Err(err) => {
                warn!(
                    asset = %asset.name,
                    attempts = err.attempts,
                    error = %format!("{:#}", err.last),
                    "asset failed"
                );
                AssetResult::failure(asset.name.clone(), format!("{:#}", err.last), lineage)
                    .with_timing(started_at, finished_at, duration)
                    .with_attempts(err.attempts)
            }
        }
    }

    fn run_once(
        &self,
        asset: &Asset,
        ctx: &PipelineContext,
        upstream: &UpstreamResults,
    ) -> anyhow::Result<Option<Value>> {
        let Some(operator) = asset.operator.as_ref() else {
            return Ok(None);
        };

        let data = match catch_unwind(AssertUnwindSafe(|| operator.apply(upstream, ctx))) {
            Ok(res) => res.with_context(|| format!("operator '{}'", operator.name()))?,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                return Err(anyhow!("operator '{}' panicked: {}", operator.name(), msg));
            }
        };

        if let Some(io) = self.io_manager.as_ref() {
            io.handle_output(ctx, asset, &data)
                .with_context(|| format!("storing output of asset '{}'", asset.name))?;
        }

        Ok(Some(data))
    }
}
