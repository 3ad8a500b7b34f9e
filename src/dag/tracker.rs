// src/dag/tracker.rs

//! Per-run readiness tracking for the parallel orchestrator.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::asset::AssetName;
use crate::dag::graph::DagGraph;
use crate::dag::plan::ExecutionPlan;
use crate::types::ErrorStrategy;

/// Per-run state of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on dependencies.
    Pending,
    /// Dependencies satisfied; waiting for a free worker.
    Ready,
    /// Dispatched to a worker.
    Running,
    DoneSuccess,
    DoneFailed,
    /// Completed by an earlier run and not executed in this one.
    Skipped,
    /// Never dispatched because the run halted on a failure.
    Abandoned,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::DoneSuccess | RunState::DoneFailed | RunState::Skipped | RunState::Abandoned
        )
    }
}

/// Structured result of a single tracker step.
#[derive(Debug, Clone, Default)]
pub struct TrackerStep {
    /// Assets whose dependencies became satisfied in this step, in plan order.
    pub newly_ready: Vec<AssetName>,
    /// Assets dropped from the run because it halted.
    pub newly_abandoned: Vec<AssetName>,
    /// Whether this step left every asset in a terminal state.
    pub run_just_finished: bool,
}

/// Decides which assets of a planned run may start.
///
/// Holds the immutable adjacency view plus the mutable per-run states.
/// Dependencies outside the plan count as satisfied.
#[derive(Debug)]
pub struct RunTracker {
    dag: DagGraph,
    order: Vec<AssetName>,
    states: HashMap<AssetName, RunState>,
    strategy: ErrorStrategy,
    halted: bool,
    finished: bool,
}

impl RunTracker {
    pub fn new(
        dag: DagGraph,
        plan: &ExecutionPlan,
        skipped: &HashSet<AssetName>,
        strategy: ErrorStrategy,
    ) -> Self {
        let order = plan.order().to_vec();
        let states = order
            .iter()
            .map(|name| {
                let state = if skipped.contains(name) {
                    RunState::Skipped
                } else {
                    RunState::Pending
                };
                (name.clone(), state)
            })
            .collect();

        Self {
            dag,
            order,
            states,
            strategy,
            halted: false,
            finished: false,
        }
    }

    /// Seed the run: everything with satisfied dependencies becomes ready.
    pub fn start(&mut self) -> TrackerStep {
        let newly_ready = self.collect_new_ready();
        TrackerStep {
            newly_ready,
            newly_abandoned: Vec::new(),
            run_just_finished: self.maybe_finish(),
        }
    }

    pub fn state_of(&self, name: &str) -> Option<RunState> {
        self.states.get(name).copied()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// A ready asset was handed to a worker.
    pub fn mark_running(&mut self, name: &str) -> bool {
        match self.states.get_mut(name) {
            Some(state) if *state == RunState::Ready => {
                *state = RunState::Running;
                true
            }
            Some(other) => {
                warn!(asset = %name, state = ?other, "asset is not ready; not dispatching");
                false
            }
            None => false,
        }
    }

    /// Record a finished asset and return whatever became ready as a result.
    pub fn complete(&mut self, name: &str, success: bool) -> TrackerStep {
        let mut step = TrackerStep::default();

        match self.states.get_mut(name) {
            Some(state) if *state == RunState::Running => {
                *state = if success {
                    RunState::DoneSuccess
                } else {
                    RunState::DoneFailed
                };
            }
            Some(state) => {
                warn!(asset = %name, state = ?state, "completion for asset that is not running; ignoring");
                step.run_just_finished = self.maybe_finish();
                return step;
            }
            None => {
                warn!(asset = %name, "completion for asset outside this run; ignoring");
                return step;
            }
        }

        if !success && self.strategy == ErrorStrategy::FailFast {
            debug!(asset = %name, "fail-fast: halting run");
            return self.halt();
        }
        if !self.halted {
            step.newly_ready = self.collect_new_ready();
        }

        step.run_just_finished = self.maybe_finish();
        step
    }

    /// Stop starting new assets; running ones may still complete.
    pub fn halt(&mut self) -> TrackerStep {
        self.halted = true;
        let newly_abandoned = self.abandon_unstarted();
        TrackerStep {
            newly_ready: Vec::new(),
            newly_abandoned,
            run_just_finished: self.maybe_finish(),
        }
    }

    fn deps_satisfied(&self, name: &str) -> bool {
        self.dag.dependencies_of(name).iter().all(|dep| {
            match self.states.get(dep) {
                // Not part of this run.
                None => true,
                Some(RunState::DoneSuccess) | Some(RunState::Skipped) => true,
                Some(RunState::DoneFailed) => self.strategy == ErrorStrategy::Continue,
                Some(_) => false,
            }
        })
    }

    /// Mark pending assets with satisfied dependencies as `Ready`.
    fn collect_new_ready(&mut self) -> Vec<AssetName> {
        // Decide first, then mutate.
        let candidates: Vec<AssetName> = self
            .order
            .iter()
            .filter(|name| self.states.get(name.as_str()) == Some(&RunState::Pending))
            .filter(|name| self.deps_satisfied(name))
            .cloned()
            .collect();

        for name in candidates.iter() {
            if let Some(state) = self.states.get_mut(name) {
                *state = RunState::Ready;
            }
            debug!(asset = %name, "dependencies satisfied; marking Ready");
        }

        candidates
    }

    fn abandon_unstarted(&mut self) -> Vec<AssetName> {
        let mut abandoned = Vec::new();
        for name in self.order.iter() {
            if let Some(state) = self.states.get_mut(name) {
                if matches!(*state, RunState::Pending | RunState::Ready) {
                    *state = RunState::Abandoned;
                    abandoned.push(name.clone());
                }
            }
        }
        abandoned
    }

    fn maybe_finish(&mut self) -> bool {
        if self.finished {
            return false;
        }
        if self.states.values().all(|s| s.is_terminal()) {
            self.finished = true;
            true
        } else {
            false
        }
    }
}
