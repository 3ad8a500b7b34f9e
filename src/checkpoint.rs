// src/checkpoint.rs

//! Checkpointing and resume.
//!
//! A checkpoint is recorded for every asset that completes successfully.
//! Resuming a run executes only the assets that are not covered by a
//! checkpoint and feeds checkpointed results to them as upstream inputs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asset::{AssetGraph, AssetName, AssetResult};
use crate::errors::{FlowError, Result};
use crate::store::StateStore;

/// Immutable record of one completed asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub pipeline_id: String,
    pub run_id: String,
    pub asset_name: AssetName,
    pub timestamp: DateTime<Utc>,
    pub result: AssetResult,
}

/// All checkpoints of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub pipeline_id: String,
    pub run_id: String,
    pub checkpoints: Vec<Checkpoint>,
    pub last_checkpointed: Option<AssetName>,
}

impl CheckpointState {
    pub fn new(pipeline_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    /// Rebuild from persisted checkpoints, in save order.
    pub fn from_checkpoints(run_id: impl Into<String>, checkpoints: Vec<Checkpoint>) -> Self {
        let run_id = run_id.into();
        let pipeline_id = checkpoints
            .first()
            .map(|c| c.pipeline_id.clone())
            .unwrap_or_default();
        let last_checkpointed = checkpoints.last().map(|c| c.asset_name.clone());
        Self {
            pipeline_id,
            run_id,
            checkpoints,
            last_checkpointed,
        }
    }

    pub fn push(&mut self, checkpoint: Checkpoint) {
        self.last_checkpointed = Some(checkpoint.asset_name.clone());
        self.checkpoints.push(checkpoint);
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Checkpointed results keyed by asset name; later checkpoints win.
    pub fn results(&self) -> HashMap<AssetName, AssetResult> {
        self.checkpoints
            .iter()
            .map(|c| (c.asset_name.clone(), c.result.clone()))
            .collect()
    }

    /// The part of `order` that still has to run, in plan order.
    ///
    /// An asset runs again when it has no checkpoint, or when one of its
    /// dependencies runs again. For a run that stopped at its first failure
    /// this is the suffix after the last checkpointed asset; it also picks up
    /// assets that failed under `Continue` and checkpoints saved out of plan
    /// order by parallel runs.
    ///
    /// Fails if any checkpoint names an asset that is not in `order`.
    pub fn resume_point(&self, graph: &AssetGraph, order: &[AssetName]) -> Result<Vec<AssetName>> {
        if let Some(stray) = self
            .checkpoints
            .iter()
            .find(|c| !order.contains(&c.asset_name))
        {
            return Err(FlowError::AssetNotFound(format!(
                "checkpoint of run '{}' references '{}', which is not part of the plan",
                self.run_id, stray.asset_name
            )));
        }

        let done: HashSet<&str> = self
            .checkpoints
            .iter()
            .map(|c| c.asset_name.as_str())
            .collect();
        let mut rerun: HashSet<&str> = HashSet::new();
        let mut remaining = Vec::new();

        for name in order {
            let stale = !done.contains(name.as_str())
                || graph
                    .dependencies_of(name)
                    .iter()
                    .any(|dep| rerun.contains(dep.as_str()));
            if stale {
                rerun.insert(name.as_str());
                remaining.push(name.clone());
            }
        }

        Ok(remaining)
    }
}

/// Records checkpoints for a run and persists them through a [`StateStore`].
///
/// Checkpoints are either persisted immediately ([`record`](Self::record))
/// or buffered and written in batches ([`buffer`](Self::buffer) +
/// [`flush`](Self::flush)).
#[derive(Debug)]
pub struct CheckpointManager {
    store: Arc<dyn StateStore>,
    state: Mutex<CheckpointState>,
    pending: Mutex<Vec<Checkpoint>>,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn StateStore>,
        pipeline_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            state: Mutex::new(CheckpointState::new(pipeline_id, run_id)),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Continue recording into an existing run.
    pub fn resume(store: Arc<dyn StateStore>, state: CheckpointState) -> Self {
        Self {
            store,
            state: Mutex::new(state),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Load the checkpoints of `run_id`; `None` if the run has none.
    pub fn load(store: &dyn StateStore, run_id: &str) -> Result<Option<CheckpointState>> {
        let checkpoints = store.load_checkpoints(run_id)?;
        if checkpoints.is_empty() {
            return Ok(None);
        }
        Ok(Some(CheckpointState::from_checkpoints(run_id, checkpoints)))
    }

    /// Checkpoint a successful result and persist it now. Failed results
    /// are not checkpointed.
    pub fn record(&self, result: &AssetResult) -> Result<()> {
        if let Some(checkpoint) = self.stage(result) {
            self.persist(std::slice::from_ref(&checkpoint))?;
        }
        Ok(())
    }

    fn stage(&self, result: &AssetResult) -> Option<Checkpoint> {
        if !result.success {
            return None;
        }

        let mut state = lock(&self.state);
        let checkpoint = Checkpoint {
            pipeline_id: state.pipeline_id.clone(),
            run_id: state.run_id.clone(),
            asset_name: result.asset_name.clone(),
            timestamp: Utc::now(),
            result: result.clone(),
        };
        state.push(checkpoint.clone());
        debug!(asset = %checkpoint.asset_name, run_id = %checkpoint.run_id, "checkpointed asset");
        Some(checkpoint)
    }

    /// Persist every staged checkpoint.
    pub fn flush(&self) -> Result<()> {
        let batch: Vec<Checkpoint> = {
            let mut pending = lock(&self.pending);
            pending.drain(..).collect()
        };
        self.persist(&batch)
    }

    /// Checkpoint a successful result; persisted by the next [`flush`](Self::flush).
    pub fn buffer(&self, result: &AssetResult) {
        if let Some(checkpoint) = self.stage(result) {
            lock(&self.pending).push(checkpoint);
        }
    }

    pub fn state(&self) -> CheckpointState {
        lock(&self.state).clone()
    }

    fn persist(&self, batch: &[Checkpoint]) -> Result<()> {
        for checkpoint in batch {
            self.store.save_checkpoint(checkpoint)?;
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
