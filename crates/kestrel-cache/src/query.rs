//! Query parameters and result shapes for the read surface.
//!
//! Start/end accept either a relative duration expression ("1h", "30m")
//! or an absolute RFC 3339 timestamp.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kestrel_core::parse_duration;
use kestrel_core::types::{Check, CheckStatus, Latency, Uptime};

use crate::error::{CacheError, CacheResult};

/// Default query range when no start is given.
pub const DEFAULT_RANGE: Duration = Duration::from_secs(3600);

/// Default bound on trailing statuses returned per check.
pub const DEFAULT_STATUS_COUNT: usize = 100;

/// Parameters for a status query.
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub check_id: Uuid,
    /// Relative duration ("1h") or RFC 3339 timestamp. Empty = 1h ago.
    pub start: String,
    /// Relative duration or RFC 3339 timestamp. Empty = now.
    pub end: String,
    /// Bound on the number of trailing statuses returned.
    pub status_count: usize,
    /// Aggregation window for time-series queries; None = raw points.
    pub window: Option<Duration>,
}

impl QueryParams {
    pub fn new(check_id: Uuid) -> Self {
        Self {
            check_id,
            start: String::new(),
            end: String::new(),
            status_count: DEFAULT_STATUS_COUNT,
            window: None,
        }
    }

    pub fn with_start(mut self, start: &str) -> Self {
        self.start = start.to_string();
        self
    }

    pub fn with_end(mut self, end: &str) -> Self {
        self.end = end.to_string();
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Resolve the start bound against `now`.
    pub fn start_time(&self, now: DateTime<Utc>) -> CacheResult<DateTime<Utc>> {
        if self.start.is_empty() {
            return Ok(now - DEFAULT_RANGE);
        }
        parse_time_expr(&self.start, now)
    }

    /// Resolve the end bound against `now`.
    pub fn end_time(&self, now: DateTime<Utc>) -> CacheResult<DateTime<Utc>> {
        if self.end.is_empty() {
            return Ok(now);
        }
        parse_time_expr(&self.end, now)
    }
}

/// Parse a time expression: a relative duration is subtracted from `now`,
/// otherwise the value must be an RFC 3339 timestamp.
pub fn parse_time_expr(expr: &str, now: DateTime<Utc>) -> CacheResult<DateTime<Utc>> {
    if let Some(duration) = parse_duration(expr) {
        return Ok(now - duration);
    }
    expr.parse::<DateTime<Utc>>().map_err(|_| {
        CacheError::TimeExpr(format!(
            "{expr:?} is neither a duration nor an RFC 3339 timestamp"
        ))
    })
}

/// A check with its trailing statuses and pre-aggregated summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckSummary {
    pub check: Check,
    /// Trailing statuses, newest first, bounded by the query's count.
    pub statuses: Vec<CheckStatus>,
    pub uptime: Uptime,
    pub latency: Latency,
}

/// One bucket of a windowed time-series query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeseries {
    pub time: DateTime<Utc>,
    /// All observations in the bucket passed.
    pub status: bool,
    /// Mean duration over the bucket, in milliseconds.
    pub duration_ms: u64,
    pub passed: u64,
    pub failed: u64,
}

/// 95th percentile of a set of duration samples, in milliseconds.
pub(crate) fn percentile_95(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let idx = (sorted.len() as f64 * 0.95) as usize;
    sorted[idx.min(sorted.len() - 1)] as f64
}
