// src/engine/core.rs

//! Pure core of the orchestration engine.
//!
//! This module contains a synchronous, deterministic state machine that
//! consumes [`OrchestratorEvent`]s and produces:
//! - an updated core state
//! - a list of [`CoreCommand`]s describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::OrchestrationEngine`) is responsible
//! for running assets on workers and feeding their outcomes back in. The
//! core can be unit tested without any Tokio, channels or operators.

use std::collections::VecDeque;

use crate::asset::AssetName;
use crate::dag::RunTracker;
use crate::engine::event_handlers::{
    CoreCommand, CoreStep, Slots, handle_asset_completed, handle_halt, handle_start,
};

/// Events flowing into the core from the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    AssetCompleted { asset: AssetName, success: bool },
    /// Stop dispatching (e.g. state could not be persisted).
    HaltRequested,
}

/// Pure orchestrator state: the run tracker, the ready queue and the
/// worker budget. No channels, no Tokio types, no IO.
#[derive(Debug)]
pub struct OrchestratorCore {
    tracker: RunTracker,
    queue: VecDeque<AssetName>,
    in_flight: usize,
    max_workers: usize,
}

impl OrchestratorCore {
    /// `max_workers` is clamped to at least 1.
    pub fn new(tracker: RunTracker, max_workers: usize) -> Self {
        Self {
            tracker,
            queue: VecDeque::new(),
            in_flight: 0,
            max_workers: max_workers.max(1),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_finished(&self) -> bool {
        self.tracker.is_finished() && self.in_flight == 0
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    /// Produce the initial dispatch.
    pub fn start(&mut self) -> CoreStep {
        handle_start(self.slots())
    }

    /// Handle a single event, returning the resulting commands.
    pub fn step(&mut self, event: OrchestratorEvent) -> CoreStep {
        match event {
            OrchestratorEvent::AssetCompleted { asset, success } => {
                handle_asset_completed(self.slots(), asset, success)
            }
            OrchestratorEvent::HaltRequested => handle_halt(self.slots()),
        }
    }

    fn slots(&mut self) -> Slots<'_> {
        Slots {
            tracker: &mut self.tracker,
            queue: &mut self.queue,
            in_flight: &mut self.in_flight,
            max_workers: self.max_workers,
        }
    }
}

impl CoreStep {
    pub fn dispatched(&self) -> Vec<AssetName> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Dispatch(names) => Some(names.clone()),
                CoreCommand::Finish => None,
            })
            .flatten()
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.commands.contains(&CoreCommand::Finish)
    }
}
