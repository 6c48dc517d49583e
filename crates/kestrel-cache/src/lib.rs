//! kestrel-cache — the layered result cache.
//!
//! Two links compose into a chain of responsibility:
//!
//! - `InMemoryCache` — bounded ring of recent statuses per check key,
//!   for low-latency reads. A miss returns nothing, never an error.
//! - `DurableCache` — the state store link, source of truth. Treats
//!   (check id, time) as a natural key so duplicate submissions (e.g.
//!   retried pushes) are absorbed as no-ops.
//!
//! Writes fan out to every link in fixed order (memory first, then
//! durable); reads return the first non-empty answer. Windowed summary
//! queries (pass/fail counts, p95 latency, time-series buckets) are
//! answered by the durable link only.

pub mod chain;
pub mod durable;
pub mod error;
pub mod mem;
pub mod query;
pub mod window;

pub use chain::CacheChain;
pub use durable::DurableCache;
pub use error::{CacheError, CacheResult};
pub use mem::InMemoryCache;
pub use query::{CheckSummary, QueryParams, Timeseries};
pub use window::choose_window;

use chrono::{DateTime, Utc};
use kestrel_core::types::{Canary, Check, CheckStatus};
use uuid::Uuid;

/// One link in the result cache chain.
pub trait CacheLink: Send + Sync {
    /// Record a check and its new statuses. Returns the canonical check
    /// id when this link owns identity (the durable link), None otherwise.
    fn add(&self, check: &Check, statuses: &[CheckStatus]) -> CacheResult<Option<Uuid>>;

    /// Trailing statuses for a check key, newest first, bounded by `limit`.
    fn list_statuses(&self, check_key: &str, limit: usize) -> CacheResult<Vec<CheckStatus>>;

    /// The raw detail payload for one observation. `None` time means the
    /// most recent observation.
    fn get_details(
        &self,
        check_key: &str,
        time: Option<DateTime<Utc>>,
    ) -> CacheResult<Option<serde_json::Value>>;

    /// Drop all of a canary's checks from this link.
    fn remove_canary(&self, canary: &Canary) -> CacheResult<()>;

    /// Drop a single check by key from this link.
    fn remove_check(&self, check_key: &str) -> CacheResult<()>;
}
