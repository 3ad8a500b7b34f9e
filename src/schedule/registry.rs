// src/schedule/registry.rs

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use crate::asset::AssetGraph;

/// Resolves a schedule's `graph_ref` to the graph to run.
///
/// Lookups happen at trigger time, so re-registering a graph changes what
/// future runs execute.
pub trait GraphRegistry: Send + Sync + Debug {
    fn resolve(&self, name: &str) -> Option<Arc<AssetGraph>>;
}

/// Graphs registered in-process, keyed by graph name.
#[derive(Debug, Default)]
pub struct StaticGraphRegistry {
    graphs: RwLock<HashMap<String, Arc<AssetGraph>>>,
}

impl StaticGraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(self, graph: AssetGraph) -> Self {
        self.register(graph);
        self
    }

    /// Register (or replace) a graph under its own name.
    pub fn register(&self, graph: AssetGraph) {
        let mut graphs = self
            .graphs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        graphs.insert(graph.name().to_string(), Arc::new(graph));
    }

    pub fn names(&self) -> Vec<String> {
        let graphs = self
            .graphs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = graphs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl GraphRegistry for StaticGraphRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<AssetGraph>> {
        self.graphs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }
}
