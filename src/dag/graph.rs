// src/dag/graph.rs

use std::collections::HashMap;

use crate::asset::{AssetGraph, AssetName};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Declaration position in the source graph.
    position: usize,
    /// Direct dependencies: assets that must complete before this one runs.
    deps: Vec<AssetName>,
    /// Direct dependents: assets that consume this one.
    dependents: Vec<AssetName>,
}

/// Adjacency-list view of an [`AssetGraph`] keyed by asset name.
///
/// Dependencies are kept exactly as declared (including references to
/// undeclared assets) so the planner can report them; dependents only link
/// declared assets.
#[derive(Debug, Clone)]
pub struct DagGraph {
    order: Vec<AssetName>,
    nodes: HashMap<AssetName, DagNode>,
}

impl DagGraph {
    pub fn from_asset_graph(graph: &AssetGraph) -> Self {
        let mut nodes: HashMap<AssetName, DagNode> = HashMap::with_capacity(graph.len());
        let order: Vec<AssetName> = graph.asset_names().map(str::to_string).collect();

        // First pass: create nodes with their dependency lists.
        for (position, name) in order.iter().enumerate() {
            nodes.insert(
                name.clone(),
                DagNode {
                    position,
                    deps: graph.dependencies_of(name).to_vec(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents in declaration order.
        for name in order.iter() {
            let deps = nodes
                .get(name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        Self { order, nodes }
    }

    /// Asset names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).map(|n| n.position)
    }

    /// Immediate dependencies of an asset.
    pub fn dependencies_of(&self, name: &str) -> &[AssetName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of an asset.
    pub fn dependents_of(&self, name: &str) -> &[AssetName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
