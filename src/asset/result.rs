// src/asset/result.rs

//! Outcomes of asset and run execution.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::AssetName;

/// Outcome of executing one asset once (possibly after retries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetResult {
    pub asset_name: AssetName,
    pub success: bool,
    /// Always `None` for failed results.
    pub data: Option<Value>,
    pub error: Option<String>,
    /// Upstream asset names consumed, in declaration order.
    pub lineage: Vec<AssetName>,
    pub duration: Duration,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// blake3 hex digest of the JSON-serialised data.
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default = "one")]
    pub attempts: u32,
}

fn one() -> u32 {
    1
}

impl AssetResult {
    pub fn success(
        asset_name: impl Into<AssetName>,
        data: Option<Value>,
        lineage: Vec<AssetName>,
    ) -> Self {
        let checksum = data.as_ref().map(checksum_of);
        Self {
            asset_name: asset_name.into(),
            success: true,
            data,
            error: None,
            lineage,
            duration: Duration::ZERO,
            metrics: BTreeMap::new(),
            checksum,
            started_at: None,
            finished_at: None,
            attempts: 1,
        }
    }

    pub fn failure(
        asset_name: impl Into<AssetName>,
        error: impl Into<String>,
        lineage: Vec<AssetName>,
    ) -> Self {
        Self {
            asset_name: asset_name.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            lineage,
            duration: Duration::ZERO,
            metrics: BTreeMap::new(),
            checksum: None,
            started_at: None,
            finished_at: None,
            attempts: 1,
        }
    }

    pub fn with_timing(
        mut self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self.duration = duration;
        self.metrics
            .insert("duration_secs".to_string(), duration.as_secs_f64());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self.metrics.insert("attempts".to_string(), f64::from(attempts));
        self
    }
}

/// Stable content digest for asset output.
pub fn checksum_of(data: &Value) -> String {
    // serde_json::Value serialises maps in key order, so this is deterministic.
    let bytes = serde_json::to_vec(data).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Name-keyed view over the results of an asset's direct upstreams.
///
/// Handles zero, one or many upstreams the same way. Iteration follows the
/// order in which the upstream names were declared on the asset.
#[derive(Debug, Clone, Default)]
pub struct UpstreamResults {
    entries: IndexMap<AssetName, AssetResult>,
}

impl UpstreamResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: AssetResult) {
        self.entries.insert(result.asset_name.clone(), result);
    }

    pub fn get(&self, name: &str) -> Option<&AssetResult> {
        self.entries.get(name)
    }

    /// Output data of a successful upstream, if any.
    pub fn data(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).and_then(|r| r.data.as_ref())
    }

    /// The data of the only upstream, for single-input transforms.
    pub fn single(&self) -> Option<&Value> {
        if self.entries.len() == 1 {
            self.entries.values().next().and_then(|r| r.data.as_ref())
        } else {
            None
        }
    }

    pub fn names(&self) -> Vec<AssetName> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssetResult)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.values().all(|r| r.success)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upstream data as a JSON object keyed by asset name (`null` for
    /// failed upstreams).
    pub fn to_json(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.data.clone().unwrap_or(Value::Null)))
            .collect();
        Value::Object(map)
    }
}

impl FromIterator<AssetResult> for UpstreamResults {
    fn from_iter<I: IntoIterator<Item = AssetResult>>(iter: I) -> Self {
        let mut out = Self::new();
        for r in iter {
            out.insert(r);
        }
        out
    }
}

/// Outcome of one full engine invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub pipeline_id: String,
    pub run_id: String,
    pub success: bool,
    /// Results in completion order.
    pub results: IndexMap<AssetName, AssetResult>,
    pub assets_executed: usize,
    pub assets_succeeded: usize,
    pub assets_failed: usize,
    /// Assets skipped because an earlier run already completed them.
    #[serde(default)]
    pub assets_skipped: Vec<AssetName>,
    pub errors: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl ExecutionResult {
    pub fn new(pipeline_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    /// Record the outcome of an asset that this run executed.
    pub fn record(&mut self, result: AssetResult) {
        self.assets_executed += 1;
        if result.success {
            self.assets_succeeded += 1;
        } else {
            self.assets_failed += 1;
            let msg = result.error.as_deref().unwrap_or("unknown error");
            self.errors
                .push(format!("asset '{}' failed: {}", result.asset_name, msg));
        }
        self.results.insert(result.asset_name.clone(), result);
    }

    /// Set `success` and timing metrics. Call once, at the end of the run.
    pub fn finalize(&mut self, total: Duration) {
        self.success = self.assets_failed == 0;
        self.metrics
            .insert("total_duration_secs".to_string(), total.as_secs_f64());
        self.metrics
            .insert("assets_executed".to_string(), self.assets_executed as f64);
        self.metrics
            .insert("assets_skipped".to_string(), self.assets_skipped.len() as f64);
    }

    pub fn get(&self, name: &str) -> Option<&AssetResult> {
        self.results.get(name)
    }

    /// Completion position of an asset within this run.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.results.get_index_of(name)
    }

    pub fn succeeded(&self, name: &str) -> bool {
        self.results.get(name).is_some_and(|r| r.success)
    }
}
