// src/asset/io.rs

//! Storage boundary for asset outputs ("IO managers").
//!
//! The engines never persist outputs themselves; when an [`IoManager`] is
//! configured on the [`Executor`](crate::exec::Executor), successful outputs
//! are handed to it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::asset::{Asset, PipelineContext};

pub trait IoManager: Send + Sync + Debug {
    fn handle_output(&self, ctx: &PipelineContext, asset: &Asset, data: &Value) -> Result<()>;
    fn load_input(&self, ctx: &PipelineContext, asset: &Asset) -> Result<Value>;
    fn has_asset(&self, ctx: &PipelineContext, asset: &Asset) -> bool;
}

/// Keeps outputs in memory, keyed by asset URI.
#[derive(Debug, Default)]
pub struct InMemoryIoManager {
    outputs: Mutex<HashMap<String, Value>>,
}

impl InMemoryIoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IoManager for InMemoryIoManager {
    fn handle_output(&self, _ctx: &PipelineContext, asset: &Asset, data: &Value) -> Result<()> {
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|_| anyhow!("in-memory io manager lock poisoned"))?;
        outputs.insert(asset.uri.clone(), data.clone());
        Ok(())
    }

    fn load_input(&self, _ctx: &PipelineContext, asset: &Asset) -> Result<Value> {
        let outputs = self
            .outputs
            .lock()
            .map_err(|_| anyhow!("in-memory io manager lock poisoned"))?;
        outputs
            .get(&asset.uri)
            .cloned()
            .ok_or_else(|| anyhow!("no stored output for asset '{}' at {}", asset.name, asset.uri))
    }

    fn has_asset(&self, _ctx: &PipelineContext, asset: &Asset) -> bool {
        self.outputs
            .lock()
            .map(|m| m.contains_key(&asset.uri))
            .unwrap_or(false)
    }
}
