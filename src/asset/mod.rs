// src/asset/mod.rs

//! Asset graph model.
//!
//! - [`operator`] holds the computation attached to an asset.
//! - [`graph`] holds [`Asset`] and the immutable [`AssetGraph`].
//! - [`context`] holds the per-run [`PipelineContext`].
//! - [`result`] holds per-asset and per-run outcomes.
//! - [`io`] is the storage boundary for asset outputs.

pub mod context;
pub mod graph;
pub mod io;
pub mod operator;
pub mod result;

/// Canonical asset name type used throughout the engine.
pub type AssetName = String;

pub use context::{PipelineContext, new_run_id};
pub use graph::{Asset, AssetGraph, AssetGraphBuilder};
pub use io::{InMemoryIoManager, IoManager};
pub use operator::{Compute, Operator, OperatorKind};
pub use result::{AssetResult, ExecutionResult, UpstreamResults, checksum_of};
