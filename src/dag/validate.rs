// src/dag/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::asset::AssetGraph;
use crate::dag::graph::DagGraph;
use crate::dag::plan::find_cycle;
use crate::errors::{FlowError, Result};

/// Check every structural invariant of a graph.
///
/// Returns the first problem found, in declaration order: a dependency
/// entry for an undeclared asset, a dependency on an undeclared asset, or
/// a cycle (self-dependencies are reported as one-node cycles).
pub fn validate_graph(graph: &AssetGraph) -> Result<()> {
    check_references(graph)?;

    let dag = DagGraph::from_asset_graph(graph);
    validate_acyclic(&dag)
}

/// Every dependency key and every dependency target must be a declared asset.
pub fn check_references(graph: &AssetGraph) -> Result<()> {
    for asset in graph.assets() {
        for dep in graph.dependencies_of(&asset.name) {
            if !graph.contains(dep) {
                return Err(FlowError::UnknownDependency {
                    asset: asset.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut dangling: Vec<&String> = graph
        .dependencies()
        .keys()
        .filter(|name| !graph.contains(name))
        .collect();
    dangling.sort();
    if let Some(name) = dangling.first() {
        return Err(FlowError::AssetNotFound((*name).clone()));
    }

    Ok(())
}

fn validate_acyclic(dag: &DagGraph) -> Result<()> {
    // Edge direction: dep -> asset.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in dag.names() {
        graph.add_node(name);
    }
    for name in dag.names() {
        for dep in dag.dependencies_of(name) {
            graph.add_edge(dep.as_str(), name, ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            // petgraph only names one node; recover the full path.
            let path = find_cycle(dag).unwrap_or_else(|| {
                let node = cycle.node_id().to_string();
                vec![node.clone(), node]
            });
            Err(FlowError::Cycle { path })
        }
    }
}
