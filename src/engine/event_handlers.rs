// src/engine/event_handlers.rs

//! Event handling logic for the orchestrator core.

use std::collections::VecDeque;

use tracing::debug;

use crate::asset::AssetName;
use crate::dag::{RunState, RunTracker, TrackerStep};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Start these assets on workers.
    Dispatch(Vec<AssetName>),
    /// Every asset is settled and nothing is in flight.
    Finish,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the shell should keep waiting for completions.
    pub keep_running: bool,
}

/// Mutable pieces of the core that handlers operate on.
#[derive(Debug)]
pub struct Slots<'a> {
    pub tracker: &'a mut RunTracker,
    pub queue: &'a mut VecDeque<AssetName>,
    pub in_flight: &'a mut usize,
    pub max_workers: usize,
}

/// Handle an asset completion: update the tracker, queue newly ready
/// assets and fill free worker slots.
pub fn handle_asset_completed(slots: Slots<'_>, asset: AssetName, success: bool) -> CoreStep {
    // Only a running asset holds a worker slot.
    if slots.tracker.state_of(&asset) == Some(RunState::Running) {
        *slots.in_flight = slots.in_flight.saturating_sub(1);
    }
    let step = slots.tracker.complete(&asset, success);
    debug!(asset = %asset, success, in_flight = *slots.in_flight, "asset completed");
    apply_tracker_step(slots, step)
}

/// Seed a run from the tracker's initial ready set.
pub fn handle_start(slots: Slots<'_>) -> CoreStep {
    let step = slots.tracker.start();
    apply_tracker_step(slots, step)
}

/// Stop starting new work; in-flight assets still report back.
pub fn handle_halt(slots: Slots<'_>) -> CoreStep {
    let step = slots.tracker.halt();
    apply_tracker_step(slots, step)
}

fn apply_tracker_step(slots: Slots<'_>, step: TrackerStep) -> CoreStep {
    let Slots {
        tracker,
        queue,
        in_flight,
        max_workers,
    } = slots;

    if !step.newly_abandoned.is_empty() {
        queue.retain(|name| !step.newly_abandoned.contains(name));
        debug!(abandoned = ?step.newly_abandoned, "dropping unstarted assets");
    }
    queue.extend(step.newly_ready);

    let mut commands = Vec::new();

    let mut dispatch = Vec::new();
    while *in_flight < max_workers {
        let Some(name) = queue.pop_front() else {
            break;
        };
        if tracker.mark_running(&name) {
            *in_flight += 1;
            dispatch.push(name);
        }
    }
    if !dispatch.is_empty() {
        commands.push(CoreCommand::Dispatch(dispatch));
    }

    let done = tracker.is_finished() && *in_flight == 0;
    if done {
        commands.push(CoreCommand::Finish);
    }

    CoreStep {
        commands,
        keep_running: !done,
    }
}
