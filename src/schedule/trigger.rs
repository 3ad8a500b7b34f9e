// src/schedule/trigger.rs

//! Trigger definitions and their firing rules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FlowError, Result};

/// Look-back window for cron schedules that have never fired.
const CRON_INITIAL_WINDOW_SECS: i64 = 60;

/// Discriminant of a [`Trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Cron,
    Interval,
    Event,
    /// Runs started by hand through the scheduler API.
    Manual,
    Backfill,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerKind::Cron => "cron",
            TriggerKind::Interval => "interval",
            TriggerKind::Event => "event",
            TriggerKind::Manual => "manual",
            TriggerKind::Backfill => "backfill",
        };
        f.write_str(s)
    }
}

/// When a schedule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// `cron` crate syntax (seconds first). Five-field expressions are
    /// accepted and run at second zero.
    Cron { expression: String },
    Interval { seconds: u64 },
    /// Fires on emitted payloads whose `type` equals `event_type` and whose
    /// values match every filter.
    Event {
        event_type: String,
        #[serde(default)]
        filters: BTreeMap<String, Value>,
        #[serde(default)]
        min_interval_secs: Option<u64>,
    },
}

impl Trigger {
    pub fn cron(expression: impl Into<String>) -> Self {
        Trigger::Cron {
            expression: expression.into(),
        }
    }

    pub fn interval(seconds: u64) -> Self {
        Trigger::Interval { seconds }
    }

    pub fn event(event_type: impl Into<String>) -> Self {
        Trigger::Event {
            event_type: event_type.into(),
            filters: BTreeMap::new(),
            min_interval_secs: None,
        }
    }

    /// Add an equality filter to an event trigger; no-op on other kinds.
    pub fn with_filter(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Trigger::Event { filters, .. } = &mut self {
            filters.insert(key.into(), value);
        }
        self
    }

    /// Debounce an event trigger; no-op on other kinds.
    pub fn with_min_interval(mut self, secs: u64) -> Self {
        if let Trigger::Event {
            min_interval_secs, ..
        } = &mut self
        {
            *min_interval_secs = Some(secs);
        }
        self
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Cron { .. } => TriggerKind::Cron,
            Trigger::Interval { .. } => TriggerKind::Interval,
            Trigger::Event { .. } => TriggerKind::Event,
        }
    }

    pub fn is_time_based(&self) -> bool {
        !matches!(self, Trigger::Event { .. })
    }

    /// Seconds between interval firings, if this is an interval trigger.
    pub fn interval_seconds(&self) -> Option<u64> {
        match self {
            Trigger::Interval { seconds } => Some(*seconds),
            _ => None,
        }
    }

    /// Check that the trigger can ever fire.
    pub fn validate(&self) -> Result<()> {
        match self {
            Trigger::Cron { expression } => parse_cron(expression).map(|_| ()),
            Trigger::Interval { seconds } => {
                if *seconds == 0 {
                    Err(FlowError::Schedule(
                        "interval trigger must be at least 1 second".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            Trigger::Event { event_type, .. } => {
                if event_type.trim().is_empty() {
                    Err(FlowError::Schedule(
                        "event trigger must name an event type".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Whether a time-based trigger is due at `now`.
    ///
    /// `last` is the last firing time; for cron triggers that never fired,
    /// callers pass the schedule's creation time. Event triggers never fire
    /// here.
    pub fn should_trigger(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<bool> {
        match self {
            Trigger::Cron { expression } => {
                let schedule = parse_cron(expression)?;
                let start =
                    last.unwrap_or_else(|| now - Duration::seconds(CRON_INITIAL_WINDOW_SECS));
                let next = schedule.after(&start.with_timezone(&tz)).next();
                Ok(next.is_some_and(|t| t.with_timezone(&Utc) <= now))
            }
            Trigger::Interval { seconds } => Ok(match last {
                None => true,
                Some(last) => now.signed_duration_since(last) >= interval_duration(*seconds),
            }),
            Trigger::Event { .. } => Ok(false),
        }
    }

    /// Whether an event trigger matches `payload` at `now`.
    pub fn should_trigger_event(
        &self,
        payload: &Value,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Trigger::Event {
            event_type,
            filters,
            min_interval_secs,
        } = self
        else {
            return false;
        };

        if payload.get("type").and_then(Value::as_str) != Some(event_type.as_str()) {
            return false;
        }

        let filters_match = filters
            .iter()
            .all(|(key, expected)| payload.get(key) == Some(expected));
        if !filters_match {
            return false;
        }

        match (min_interval_secs, last) {
            (Some(min), Some(last)) => now.signed_duration_since(last) >= interval_duration(*min),
            _ => true,
        }
    }

    /// Next firing strictly after `after`; `None` for event triggers.
    pub fn next_trigger_time(
        &self,
        after: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Option<DateTime<Utc>>> {
        match self {
            Trigger::Cron { expression } => {
                let schedule = parse_cron(expression)?;
                Ok(schedule
                    .after(&after.with_timezone(&tz))
                    .next()
                    .map(|t| t.with_timezone(&Utc)))
            }
            Trigger::Interval { seconds } => Ok(Some(after + interval_duration(*seconds))),
            Trigger::Event { .. } => Ok(None),
        }
    }
}

fn interval_duration(seconds: u64) -> Duration {
    Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX / 1_000))
}

/// Parse a cron expression, accepting the classic five-field form.
pub fn parse_cron(expression: &str) -> Result<CronSchedule> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    CronSchedule::from_str(&normalized).map_err(|e| {
        FlowError::Schedule(format!("invalid cron expression '{expression}': {e}"))
    })
}

/// Parse an IANA timezone name such as `"UTC"` or `"Europe/Oslo"`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| FlowError::Schedule(format!("invalid timezone: {name}")))
}
