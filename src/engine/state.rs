// src/engine/state.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::AssetName;

/// Which assets of a pipeline have completed or failed, across runs.
///
/// Persisted per pipeline and consulted by incremental runs. An asset is
/// never in both sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub pipeline_id: String,
    pub run_id: String,
    #[serde(default)]
    pub completed: BTreeSet<AssetName>,
    #[serde(default)]
    pub failed: BTreeSet<AssetName>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(pipeline_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            pipeline_id: pipeline_id.into(),
            run_id: run_id.into(),
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Carry a loaded state into a new run.
    pub fn continue_as(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self.started_at = Utc::now();
        self.updated_at = self.started_at;
        self
    }

    pub fn mark_completed(&mut self, asset: &str) {
        self.failed.remove(asset);
        self.completed.insert(asset.to_string());
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, asset: &str) {
        self.completed.remove(asset);
        self.failed.insert(asset.to_string());
        self.updated_at = Utc::now();
    }

    pub fn is_completed(&self, asset: &str) -> bool {
        self.completed.contains(asset)
    }

    pub fn is_failed(&self, asset: &str) -> bool {
        self.failed.contains(asset)
    }
}
