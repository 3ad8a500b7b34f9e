// src/dag/mod.rs

//! DAG representation, planning and per-run tracking.
//!
//! - [`graph`] holds the adjacency-list view of an asset graph.
//! - [`plan`] detects cycles, orders assets and restricts to targets.
//! - [`validate`] checks structural invariants when a graph is built.
//! - [`tracker`] contains the per-run state machine that decides which
//!   assets are ready to run.

pub mod graph;
pub mod plan;
pub mod tracker;
pub mod validate;

pub use graph::DagGraph;
pub use plan::{ExecutionPlan, find_cycle, plan, topological_order, upstream_closure};
pub use tracker::{RunState, RunTracker, TrackerStep};
pub use validate::validate_graph;
