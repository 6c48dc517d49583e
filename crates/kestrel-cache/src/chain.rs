//! The cache chain — fan-out writes, first-hit reads.
//!
//! Writes for one `add` call happen in fixed order: in-memory first, then
//! durable. Reads consult links in the same order and return the first
//! non-empty answer; status listings are merged across links with
//! dedup on observation time, in-memory entries preferred.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kestrel_core::types::{Canary, Check, CheckStatus, Latency, Uptime};
use kestrel_state::StateStore;

use crate::durable::DurableCache;
use crate::error::CacheResult;
use crate::mem::InMemoryCache;
use crate::query::{CheckSummary, QueryParams, Timeseries};
use crate::CacheLink;

/// The composed result cache.
pub struct CacheChain {
    mem: InMemoryCache,
    durable: DurableCache,
}

impl CacheChain {
    pub fn new(store: StateStore, mem_capacity: usize) -> Self {
        Self {
            mem: InMemoryCache::new(mem_capacity),
            durable: DurableCache::new(store),
        }
    }

    fn links(&self) -> [&dyn CacheLink; 2] {
        [&self.mem, &self.durable]
    }

    /// Record a check and its statuses through every link. Returns the
    /// canonical check id assigned by the durable link.
    pub fn add(&self, check: &Check, statuses: &[CheckStatus]) -> CacheResult<Uuid> {
        let mut canonical = check.id;
        for link in self.links() {
            if let Some(id) = link.add(check, statuses)? {
                canonical = id;
            }
        }
        Ok(canonical)
    }

    /// Trailing statuses for a check key, newest first, merged across
    /// links and deduplicated by observation time.
    pub fn list_statuses(&self, check_key: &str, limit: usize) -> CacheResult<Vec<CheckStatus>> {
        let mut seen = std::collections::HashSet::new();
        let mut merged: Vec<CheckStatus> = Vec::new();
        for link in self.links() {
            for status in link.list_statuses(check_key, limit)? {
                if seen.insert(status.time) {
                    merged.push(status);
                }
            }
        }
        merged.sort_by(|a, b| b.time.cmp(&a.time));
        merged.truncate(limit);
        Ok(merged)
    }

    /// The raw detail payload for one observation: first link that has it.
    pub fn get_details(
        &self,
        check_key: &str,
        time: Option<DateTime<Utc>>,
    ) -> CacheResult<Option<serde_json::Value>> {
        for link in self.links() {
            if let Some(details) = link.get_details(check_key, time)? {
                return Ok(Some(details));
            }
        }
        Ok(None)
    }

    /// Summary query with pre-aggregated pass/fail counts and p95 latency.
    /// Answered by the durable link (the source of truth).
    pub fn query(&self, params: &QueryParams, now: DateTime<Utc>) -> CacheResult<CheckSummary> {
        self.durable.query(params, now)
    }

    /// Summary query over every live check of a canary (durable link).
    pub fn query_canary(
        &self,
        canary_id: Uuid,
        params: &QueryParams,
        now: DateTime<Utc>,
    ) -> CacheResult<Vec<CheckSummary>> {
        self.durable.query_canary(canary_id, params, now)
    }

    /// Windowed (or raw) time-series query, durable link only.
    pub fn query_timeseries(
        &self,
        params: &QueryParams,
        now: DateTime<Utc>,
    ) -> CacheResult<(Vec<Timeseries>, Uptime, Latency)> {
        self.durable.query_timeseries(params, now)
    }

    /// Drop a canary's checks from every link.
    pub fn remove_canary(&self, canary: &Canary) -> CacheResult<()> {
        for link in self.links() {
            link.remove_canary(canary)?;
        }
        Ok(())
    }

    /// Drop a single check from every link.
    pub fn remove_check(&self, check_key: &str) -> CacheResult<()> {
        for link in self.links() {
            link.remove_check(check_key)?;
        }
        Ok(())
    }
}
