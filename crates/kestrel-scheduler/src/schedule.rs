//! Schedule expression parsing and next-fire computation.
//!
//! Three forms are accepted:
//! - `@never` — the canary is never scheduled
//! - `@every <duration>` — fixed period, e.g. `@every 30s`
//! - standard cron (5-field; a seconds field is prepended for the parser)

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use kestrel_core::parse_duration;

use crate::error::SchedulerError;

/// A parsed schedule expression.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Never fires.
    Never,
    /// Fires on a fixed period.
    Every(Duration),
    /// Fires per cron expression.
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse a schedule expression.
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let expr = expr.trim();
        if expr == "@never" {
            return Ok(Schedule::Never);
        }
        if let Some(period) = expr.strip_prefix("@every") {
            let duration = parse_duration(period.trim()).ok_or_else(|| {
                SchedulerError::InvalidSchedule {
                    expr: expr.to_string(),
                    reason: "bad duration".to_string(),
                }
            })?;
            if duration.is_zero() {
                return Err(SchedulerError::InvalidSchedule {
                    expr: expr.to_string(),
                    reason: "zero period".to_string(),
                });
            }
            return Ok(Schedule::Every(duration));
        }

        // Standard 5-field cron; the cron crate wants a seconds field.
        let normalized = if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        };
        let parsed =
            cron::Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedule {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Schedule::Cron(Box::new(parsed)))
    }

    /// The next fire time strictly after `now`, or `None` for `@never`.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Never => None,
            Schedule::Every(period) => Some(now + *period),
            Schedule::Cron(schedule) => schedule.after(&now).next(),
        }
    }
}
