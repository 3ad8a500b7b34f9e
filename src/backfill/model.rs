// src/backfill/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::OnFailure;

/// A request to replay a schedule over a historical range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub backfill_id: String,
    pub schedule_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA timezone cron instants are evaluated in; defaults to the
    /// schedule's own timezone.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_max_parallel() -> usize {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

impl BackfillConfig {
    pub fn new(schedule_id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            backfill_id: Uuid::new_v4().to_string(),
            schedule_id: schedule_id.into(),
            start,
            end,
            timezone: None,
            parallel: false,
            max_parallel: default_max_parallel(),
            on_failure: OnFailure::default(),
            retry_attempts: default_retry_attempts(),
            created_at: Utc::now(),
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn parallel(mut self, max_parallel: usize) -> Self {
        self.parallel = true;
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One scheduled instant of a backfill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillTask {
    pub task_id: String,
    pub backfill_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BackfillTask {
    pub fn pending(backfill_id: impl Into<String>, scheduled_for: DateTime<Utc>) -> Self {
        let backfill_id = backfill_id.into();
        Self {
            task_id: format!("{}:{}", backfill_id, scheduled_for.timestamp()),
            backfill_id,
            scheduled_for,
            status: TaskStatus::Pending,
            retry_count: 0,
            run_id: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Task counts of a backfill, as persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillStatus {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl BackfillStatus {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a BackfillTask>) -> Self {
        let mut status = Self::default();
        for task in tasks {
            status.total += 1;
            match task.status {
                TaskStatus::Pending => status.pending += 1,
                TaskStatus::Running => status.running += 1,
                TaskStatus::Completed => status.completed += 1,
                TaskStatus::Failed => status.failed += 1,
            }
        }
        status
    }

    pub fn is_done(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}
