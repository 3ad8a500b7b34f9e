// src/store/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;

use crate::backfill::{BackfillConfig, BackfillTask};
use crate::checkpoint::Checkpoint;
use crate::engine::ExecutionState;
use crate::errors::{FlowError, Result};
use crate::schedule::{Schedule, ScheduleEvent};
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<String, ExecutionState>,
    checkpoints: HashMap<String, Vec<Checkpoint>>,
    schedules: HashMap<String, Schedule>,
    events: HashMap<String, Vec<ScheduleEvent>>,
    backfills: HashMap<String, BackfillConfig>,
    backfill_tasks: HashMap<String, IndexMap<String, BackfillTask>>,
}

/// In-memory store, used for tests and one-shot CLI runs.
///
/// [`set_unavailable`](MemoryStore::set_unavailable) makes every operation
/// fail, to exercise persistence-error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FlowError::Store("memory store is unavailable".to_string()));
        }
        self.inner
            .lock()
            .map_err(|_| FlowError::Store("memory store lock poisoned".to_string()))
    }
}

impl StateStore for MemoryStore {
    fn save_state(&self, state: &ExecutionState) -> Result<()> {
        self.lock()?
            .states
            .insert(state.pipeline_id.clone(), state.clone());
        Ok(())
    }

    fn load_state(&self, pipeline_id: &str) -> Result<Option<ExecutionState>> {
        Ok(self.lock()?.states.get(pipeline_id).cloned())
    }

    fn clear_state(&self, pipeline_id: &str) -> Result<bool> {
        Ok(self.lock()?.states.remove(pipeline_id).is_some())
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.lock()?
            .checkpoints
            .entry(checkpoint.run_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    fn load_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self
            .lock()?
            .checkpoints
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_schedule(&self, schedule: &Schedule) -> Result<()> {
        self.lock()?
            .schedules
            .insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    fn load_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        Ok(self.lock()?.schedules.get(id).cloned())
    }

    fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.lock()?.schedules.values().cloned().collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(schedules)
    }

    fn delete_schedule(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.schedules.remove(id).is_some())
    }

    fn save_event(&self, event: &ScheduleEvent) -> Result<()> {
        self.lock()?
            .events
            .entry(event.schedule_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn list_events(&self, schedule_id: &str) -> Result<Vec<ScheduleEvent>> {
        Ok(self
            .lock()?
            .events
            .get(schedule_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_backfill(&self, config: &BackfillConfig) -> Result<()> {
        self.lock()?
            .backfills
            .insert(config.backfill_id.clone(), config.clone());
        Ok(())
    }

    fn load_backfill(&self, backfill_id: &str) -> Result<Option<BackfillConfig>> {
        Ok(self.lock()?.backfills.get(backfill_id).cloned())
    }

    fn save_backfill_task(&self, task: &BackfillTask) -> Result<()> {
        self.lock()?
            .backfill_tasks
            .entry(task.backfill_id.clone())
            .or_default()
            .insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    fn list_backfill_tasks(&self, backfill_id: &str) -> Result<Vec<BackfillTask>> {
        let mut tasks: Vec<BackfillTask> = self
            .lock()?
            .backfill_tasks
            .get(backfill_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        tasks.sort_by_key(|t| t.scheduled_for);
        Ok(tasks)
    }
}
