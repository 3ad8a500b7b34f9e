// src/asset/context.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use uuid::Uuid;

/// Per-run execution context handed to every operator.
///
/// Cloning is cheap: clones share the same run-scoped state map, so values
/// written by one asset are visible to assets that run later in the same
/// run, whichever worker executes them.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub pipeline_id: String,
    pub run_id: String,
    pub config: Map<String, Value>,
    state: Arc<Mutex<HashMap<String, Value>>>,
}

impl PipelineContext {
    /// New context with a freshly minted run id.
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            run_id: new_run_id(),
            config: Map::new(),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.lock_state().get(key).cloned()
    }

    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.lock_state().insert(key.into(), value);
    }

    pub fn state_snapshot(&self) -> HashMap<String, Value> {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        // A panicking operator must not wedge the rest of the run.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Mint a globally unique run identifier.
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}
