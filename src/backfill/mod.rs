// src/backfill/mod.rs

//! Historical replay of a schedule.

pub mod generate;
pub mod manager;
pub mod model;

pub use generate::{MAX_BACKFILL_TASKS, scheduled_instants};
pub use manager::BackfillManager;
pub use model::{BackfillConfig, BackfillStatus, BackfillTask, TaskStatus};
