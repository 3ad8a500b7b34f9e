// src/store/mod.rs

//! Persistence for run state, checkpoints, schedules and backfills.
//!
//! Stores only promise atomic single-record operations; callers that need
//! read-modify-write consistency hold their own locks.

use std::fmt::Debug;

use crate::backfill::{BackfillConfig, BackfillTask};
use crate::checkpoint::Checkpoint;
use crate::engine::ExecutionState;
use crate::errors::Result;
use crate::schedule::{Schedule, ScheduleEvent};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

pub trait StateStore: Send + Sync + Debug {
    /// Replace the execution state of `state.pipeline_id`.
    fn save_state(&self, state: &ExecutionState) -> Result<()>;
    fn load_state(&self, pipeline_id: &str) -> Result<Option<ExecutionState>>;
    /// Returns whether a state existed.
    fn clear_state(&self, pipeline_id: &str) -> Result<bool>;

    /// Append a checkpoint to its run.
    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
    /// Checkpoints of a run in the order they were saved.
    fn load_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>>;

    /// Insert or replace a schedule by id.
    fn save_schedule(&self, schedule: &Schedule) -> Result<()>;
    fn load_schedule(&self, id: &str) -> Result<Option<Schedule>>;
    /// All schedules, ordered by creation time.
    fn list_schedules(&self) -> Result<Vec<Schedule>>;
    fn delete_schedule(&self, id: &str) -> Result<bool>;

    fn save_event(&self, event: &ScheduleEvent) -> Result<()>;
    /// Events of a schedule in the order they were saved.
    fn list_events(&self, schedule_id: &str) -> Result<Vec<ScheduleEvent>>;

    fn save_backfill(&self, config: &BackfillConfig) -> Result<()>;
    fn load_backfill(&self, backfill_id: &str) -> Result<Option<BackfillConfig>>;
    /// Insert or replace a task by id.
    fn save_backfill_task(&self, task: &BackfillTask) -> Result<()>;
    /// Tasks of a backfill ordered by `scheduled_for`.
    fn list_backfill_tasks(&self, backfill_id: &str) -> Result<Vec<BackfillTask>>;
}
