// src/dag/plan.rs

//! Planning: cycle detection, deterministic topological order and target
//! restriction.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::asset::{AssetGraph, AssetName};
use crate::dag::graph::DagGraph;
use crate::dag::validate::check_references;
use crate::errors::{FlowError, Result};

/// Ordered list of assets a run will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<AssetName>,
}

impl ExecutionPlan {
    pub fn order(&self) -> &[AssetName] {
        &self.order
    }

    pub fn contains(&self, name: &str) -> bool {
        self.order.iter().any(|n| n == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_order(self) -> Vec<AssetName> {
        self.order
    }
}

/// Plan a run over `graph`.
///
/// With an empty `targets` slice every asset is planned; otherwise the plan
/// is restricted to the targets and their transitive upstreams. Cycles are
/// always checked over the whole graph.
pub fn plan(graph: &AssetGraph, targets: &[AssetName]) -> Result<ExecutionPlan> {
    check_references(graph)?;

    let dag = DagGraph::from_asset_graph(graph);
    if let Some(path) = find_cycle(&dag) {
        return Err(FlowError::Cycle { path });
    }

    let order = topological_order(&dag)?;

    let order = if targets.is_empty() {
        order
    } else {
        let keep = upstream_closure(&dag, targets)?;
        order.into_iter().filter(|n| keep.contains(n)).collect()
    };

    debug!(graph = %graph.name(), assets = order.len(), "planned execution order");
    Ok(ExecutionPlan { order })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Find a dependency cycle with an iterative depth-first search.
///
/// The returned path starts and ends at the same asset; each element
/// depends on the one after it. Roots are visited in declaration order,
/// so the reported cycle is deterministic.
pub fn find_cycle(dag: &DagGraph) -> Option<Vec<AssetName>> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(dag.len());

    for root in dag.names() {
        if marks.contains_key(root) {
            continue;
        }

        // (node, index of the next dependency to visit)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::OnStack);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let deps = dag.dependencies_of(node);

            if frame.1 >= deps.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }

            let next = deps[frame.1].as_str();
            frame.1 += 1;

            if !dag.contains(next) {
                continue;
            }

            match marks.get(next) {
                Some(Mark::OnStack) => {
                    let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                    let mut path: Vec<AssetName> =
                        stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                    path.push(next.to_string());
                    return Some(path);
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next, Mark::OnStack);
                    stack.push((next, 0));
                }
            }
        }
    }

    None
}

/// Kahn's algorithm; among ready assets the earliest-declared goes first.
pub fn topological_order(dag: &DagGraph) -> Result<Vec<AssetName>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(dag.len());
    let mut ready: BTreeSet<(usize, &str)> = BTreeSet::new();

    for name in dag.names() {
        let degree = dag
            .dependencies_of(name)
            .iter()
            .filter(|d| dag.contains(d))
            .count();
        in_degree.insert(name, degree);
        if degree == 0 {
            ready.insert((dag.position(name).unwrap_or(usize::MAX), name));
        }
    }

    let mut order = Vec::with_capacity(dag.len());
    while let Some((_, name)) = ready.pop_first() {
        order.push(name.to_string());

        for dependent in dag.dependents_of(name) {
            if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    let pos = dag.position(dependent).unwrap_or(usize::MAX);
                    ready.insert((pos, dependent.as_str()));
                }
            }
        }
    }

    if order.len() < dag.len() {
        let path = find_cycle(dag).unwrap_or_default();
        return Err(FlowError::Cycle { path });
    }

    Ok(order)
}

/// Targets plus everything they transitively depend on.
pub fn upstream_closure(dag: &DagGraph, targets: &[AssetName]) -> Result<HashSet<AssetName>> {
    let mut keep: HashSet<AssetName> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();

    for target in targets {
        if !dag.contains(target) {
            return Err(FlowError::AssetNotFound(target.clone()));
        }
        stack.push(target.as_str());
    }

    while let Some(name) = stack.pop() {
        if !keep.insert(name.to_string()) {
            continue;
        }
        for dep in dag.dependencies_of(name) {
            if dag.contains(dep) {
                stack.push(dep.as_str());
            }
        }
    }

    Ok(keep)
}
