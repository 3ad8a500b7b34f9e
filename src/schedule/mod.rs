// src/schedule/mod.rs

//! Time- and event-driven scheduling.
//!
//! - [`trigger`] defines cron, interval and event triggers.
//! - [`model`] holds schedules and their append-only run events.
//! - [`registry`] resolves a schedule's graph reference at trigger time.
//! - [`scheduler`] is the long-lived trigger loop.

pub mod model;
pub mod registry;
pub mod scheduler;
pub mod trigger;

pub use model::{EventStatus, Schedule, ScheduleEvent, ScheduleStatus};
pub use registry::{GraphRegistry, StaticGraphRegistry};
pub use scheduler::{Scheduler, SchedulerConfig, TickReport, TriggerOutcome};
pub use trigger::{Trigger, TriggerKind, parse_cron, parse_timezone};
