//! The durable cache link — the source of truth.
//!
//! Wraps the state store. Check identity is canonicalized here: the
//! (canary id, kind, name) triple maps to one persisted check row whose
//! id is returned from `add` and used as the key for all observations.
//! Duplicate (check id, time) submissions are absorbed as no-ops.
//!
//! Summary and time-series queries with windowed aggregation are answered
//! by this link only.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;
use uuid::Uuid;

use kestrel_core::types::{Canary, Check, CheckSpec, CheckStatus, Latency, Uptime};
use kestrel_state::StateStore;

use crate::error::{CacheError, CacheResult};
use crate::query::{percentile_95, CheckSummary, QueryParams, Timeseries};
use crate::CacheLink;

/// Durable store link of the cache chain.
#[derive(Clone)]
pub struct DurableCache {
    store: StateStore,
}

impl DurableCache {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Resolve a `{canary_id}/{kind}/{name}` key to the persisted check.
    fn resolve_key(&self, check_key: &str) -> CacheResult<Option<Check>> {
        let mut parts = check_key.splitn(3, '/');
        let (canary_id, kind, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(k), Some(n)) => (c, k, n),
            _ => return Ok(None),
        };
        let canary_id: Uuid = match canary_id.parse() {
            Ok(id) => id,
            Err(_) => return Ok(None),
        };
        Ok(self
            .store
            .list_checks(canary_id)?
            .into_iter()
            .find(|c| c.kind == kind && c.name == name))
    }

    /// Summary query: the check with trailing statuses and pre-aggregated
    /// pass/fail counts and p95 latency over the window.
    pub fn query(&self, params: &QueryParams, now: DateTime<Utc>) -> CacheResult<CheckSummary> {
        let check = self
            .store
            .get_check_by_id(params.check_id)?
            .ok_or_else(|| CacheError::CheckNotFound(params.check_id.to_string()))?;

        let start = params.start_time(now)?;
        let end = params.end_time(now)?;
        let in_range = self.store.list_statuses(params.check_id, start, end)?;

        let mut uptime = Uptime::default();
        let mut durations = Vec::with_capacity(in_range.len());
        for status in &in_range {
            if status.status {
                uptime.passed += 1;
            } else {
                uptime.failed += 1;
            }
            durations.push(status.duration_ms);
        }
        let latency = Latency {
            p95_ms: percentile_95(&durations),
        };

        let mut statuses = in_range;
        statuses.reverse();
        statuses.truncate(params.status_count);

        Ok(CheckSummary {
            check,
            statuses,
            uptime,
            latency,
        })
    }

    /// Summary query over every live check of a canary.
    pub fn query_canary(
        &self,
        canary_id: Uuid,
        params: &QueryParams,
        now: DateTime<Utc>,
    ) -> CacheResult<Vec<CheckSummary>> {
        let mut summaries = Vec::new();
        for check in self.store.list_checks(canary_id)? {
            if check.deleted_at.is_some() {
                continue;
            }
            let mut params = params.clone();
            params.check_id = check.id;
            summaries.push(self.query(&params, now)?);
        }
        Ok(summaries)
    }

    /// Time-series query: bucket the window's observations by the chosen
    /// aggregation window, or return raw points when no window is set.
    ///
    /// Also returns the overall pass/fail tally and p95 latency across
    /// the returned series.
    pub fn query_timeseries(
        &self,
        params: &QueryParams,
        now: DateTime<Utc>,
    ) -> CacheResult<(Vec<Timeseries>, Uptime, Latency)> {
        let start = params.start_time(now)?;
        let end = params.end_time(now)?;
        let statuses = self.store.list_statuses(params.check_id, start, end)?;

        let series = match params.window {
            Some(window) => bucket_statuses(&statuses, window.as_secs() as i64),
            None => statuses
                .iter()
                .map(|s| Timeseries {
                    time: s.time,
                    status: s.status,
                    duration_ms: s.duration_ms,
                    passed: s.status as u64,
                    failed: !s.status as u64,
                })
                .collect(),
        };

        let mut uptime = Uptime::default();
        let mut durations = Vec::with_capacity(series.len());
        for point in &series {
            uptime.passed += point.passed;
            uptime.failed += point.failed;
            durations.push(point.duration_ms);
        }
        let latency = Latency {
            p95_ms: percentile_95(&durations),
        };

        Ok((series, uptime, latency))
    }
}

/// Group raw statuses into fixed windows, oldest first. Bucket timestamps
/// are the window midpoints rounded down, matching
/// `floor((epoch + w/2) / w) * w`.
fn bucket_statuses(statuses: &[CheckStatus], window_secs: i64) -> Vec<Timeseries> {
    struct Bucket {
        all_passed: bool,
        duration_sum: u64,
        count: u64,
        passed: u64,
        failed: u64,
    }

    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for status in statuses {
        let epoch = status.time.timestamp();
        let bucket_epoch = ((epoch + window_secs / 2).div_euclid(window_secs)) * window_secs;
        let bucket = buckets.entry(bucket_epoch).or_insert(Bucket {
            all_passed: true,
            duration_sum: 0,
            count: 0,
            passed: 0,
            failed: 0,
        });
        bucket.all_passed &= status.status;
        bucket.duration_sum += status.duration_ms;
        bucket.count += 1;
        if status.status {
            bucket.passed += 1;
        } else {
            bucket.failed += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(epoch, b)| Timeseries {
            time: Utc.timestamp_opt(epoch, 0).single().unwrap_or_default(),
            status: b.all_passed,
            duration_ms: b.duration_sum / b.count.max(1),
            passed: b.passed,
            failed: b.failed,
        })
        .collect()
}

impl CacheLink for DurableCache {
    fn add(&self, check: &Check, statuses: &[CheckStatus]) -> CacheResult<Option<Uuid>> {
        let spec = CheckSpec {
            kind: check.kind.clone(),
            name: check.name.clone(),
            description: check.description.clone(),
            labels: check.labels.clone(),
            transform_delete_strategy: check.delete_strategy,
            relationships: None,
        };
        let last_run = statuses
            .iter()
            .map(|s| s.time)
            .max()
            .unwrap_or(check.created_at);
        let canonical = self.store.upsert_check(
            check.canary_id,
            &spec,
            check.transformed,
            check.passing,
            last_run,
        )?;

        for status in statuses {
            let mut status = status.clone();
            status.check_id = canonical;
            if !self.store.insert_status(&status)? {
                debug!(check_id = %canonical, time = %status.time, "duplicate status absorbed");
            }
        }
        Ok(Some(canonical))
    }

    fn list_statuses(&self, check_key: &str, limit: usize) -> CacheResult<Vec<CheckStatus>> {
        match self.resolve_key(check_key)? {
            Some(check) => Ok(self.store.recent_statuses(check.id, limit)?),
            None => Ok(Vec::new()),
        }
    }

    fn get_details(
        &self,
        check_key: &str,
        time: Option<DateTime<Utc>>,
    ) -> CacheResult<Option<serde_json::Value>> {
        let check = match self.resolve_key(check_key)? {
            Some(check) => check,
            None => return Ok(None),
        };
        match time {
            Some(t) => Ok(self.store.get_status_detail(check.id, t)?),
            None => Ok(self
                .store
                .latest_status(check.id)?
                .and_then(|s| s.detail)),
        }
    }

    fn remove_canary(&self, canary: &Canary) -> CacheResult<()> {
        self.store.soft_delete_canary(canary.id, Utc::now())?;
        Ok(())
    }

    fn remove_check(&self, check_key: &str) -> CacheResult<()> {
        if let Some(check) = self.resolve_key(check_key)? {
            self.store
                .soft_delete_checks(check.canary_id, &[check.id], Utc::now())?;
        }
        Ok(())
    }
}
