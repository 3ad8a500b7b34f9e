// src/engine/mod.rs

//! Execution and orchestration engines.
//!
//! - [`execution`] is the single-threaded engine with checkpoint/resume.
//! - [`core`] and [`event_handlers`] hold the pure state machine of the
//!   parallel orchestrator.
//! - [`runtime`] is the async worker-pool shell around that core.
//! - [`state`] is the persisted record used for incremental runs.

pub mod core;
pub mod event_handlers;
pub mod execution;
pub mod runtime;
pub mod state;

pub use core::{OrchestratorCore, OrchestratorEvent};
pub use event_handlers::{CoreCommand, CoreStep};
pub use execution::{ExecutionEngine, RunPhase};
pub use runtime::{OrchestrationConfig, OrchestrationEngine, RunOptions};
pub use state::ExecutionState;
