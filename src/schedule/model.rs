// src/schedule/model.rs

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::Result;
use crate::schedule::trigger::{Trigger, TriggerKind, parse_timezone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
}

/// A trigger bound to a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    /// Pipeline name, resolved through a
    /// [`GraphRegistry`](crate::schedule::GraphRegistry) at trigger time.
    pub graph_ref: String,
    pub status: ScheduleStatus,
    pub timezone: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        graph_ref: impl Into<String>,
        timezone: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            trigger,
            graph_ref: graph_ref.into(),
            status: ScheduleStatus::Active,
            timezone: timezone.into(),
            config: Map::new(),
            last_triggered: None,
            created_at,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn kind(&self) -> TriggerKind {
        self.trigger.kind()
    }

    pub fn is_active(&self) -> bool {
        self.status == ScheduleStatus::Active
    }

    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Running,
    Success,
    Failed,
}

impl EventStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Running)
    }
}

/// Append-only record of one scheduled run transition.
///
/// A run produces a `Running` record when it starts and a second, terminal
/// record with the same `run_id` when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub event_id: String,
    pub schedule_id: String,
    pub trigger_kind: TriggerKind,
    pub triggered_at: DateTime<Utc>,
    pub run_id: String,
    pub status: EventStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScheduleEvent {
    pub fn started(
        schedule_id: impl Into<String>,
        trigger_kind: TriggerKind,
        run_id: impl Into<String>,
        triggered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            schedule_id: schedule_id.into(),
            trigger_kind,
            triggered_at,
            run_id: run_id.into(),
            status: EventStatus::Running,
            metadata: Map::new(),
            error: None,
        }
    }

    /// The terminal record that follows this one.
    pub fn finished(&self, status: EventStatus, error: Option<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            status,
            error,
            ..self.clone()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
