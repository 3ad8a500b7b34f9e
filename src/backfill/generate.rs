// src/backfill/generate.rs

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::errors::{FlowError, Result};
use crate::schedule::{Trigger, parse_cron};

/// Upper bound on the tasks one backfill may create.
pub const MAX_BACKFILL_TASKS: usize = 10_000;

/// Scheduled instants of `trigger` within `[start, end)`, capped at
/// [`MAX_BACKFILL_TASKS`].
pub fn scheduled_instants(
    trigger: &Trigger,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
) -> Result<Vec<DateTime<Utc>>> {
    if start >= end {
        return Err(FlowError::Backfill(format!(
            "backfill start {start} must be before end {end}"
        )));
    }

    let (instants, truncated) = match trigger {
        Trigger::Cron { expression } => cron_instants(expression, start, end, tz)?,
        Trigger::Interval { seconds } => interval_instants(*seconds, start, end)?,
        Trigger::Event { event_type, .. } => {
            return Err(FlowError::Config(format!(
                "cannot backfill event schedule '{event_type}': event triggers have no timeline"
            )));
        }
    };

    if truncated {
        warn!(
            start = %start,
            end = %end,
            max = MAX_BACKFILL_TASKS,
            "backfill range produces too many tasks; truncating"
        );
    }
    Ok(instants)
}

fn cron_instants(
    expression: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
) -> Result<(Vec<DateTime<Utc>>, bool)> {
    let schedule = parse_cron(expression)?;
    // `after` is exclusive; step back so an instant exactly at `start` counts.
    let from = (start - Duration::seconds(1)).with_timezone(&tz);

    let mut instants = Vec::new();
    for next in schedule.after(&from) {
        let next = next.with_timezone(&Utc);
        if next >= end {
            return Ok((instants, false));
        }
        if instants.len() == MAX_BACKFILL_TASKS {
            return Ok((instants, true));
        }
        instants.push(next);
    }
    Ok((instants, false))
}

fn interval_instants(
    seconds: u64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(Vec<DateTime<Utc>>, bool)> {
    let step = i64::try_from(seconds)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::seconds)
        .ok_or_else(|| FlowError::Config(format!("invalid interval: {seconds}s")))?;

    let mut instants = Vec::new();
    let mut next = start;
    while next < end {
        if instants.len() == MAX_BACKFILL_TASKS {
            return Ok((instants, true));
        }
        instants.push(next);
        next += step;
    }
    Ok((instants, false))
}
