//! The in-memory cache link.
//!
//! Keeps a bounded ring of recent statuses per check key. Purely an
//! acceleration layer: lazily filled by writes, lost on restart, and a
//! miss simply yields nothing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kestrel_core::types::{Canary, Check, CheckStatus};

use crate::error::CacheResult;
use crate::CacheLink;

/// Default per-key ring capacity.
pub const DEFAULT_CAPACITY: usize = 300;

struct Inner {
    checks: HashMap<String, Check>,
    /// Newest first per key.
    statuses: HashMap<String, VecDeque<CheckStatus>>,
}

/// Bounded in-memory ring cache, keyed by `{canary_id}/{kind}/{name}`.
pub struct InMemoryCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                checks: HashMap::new(),
                statuses: HashMap::new(),
            }),
            capacity,
        }
    }

    /// Number of check keys currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached check row for a key, if present.
    pub fn get_check(&self, check_key: &str) -> Option<Check> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.checks.get(check_key).cloned()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CacheLink for InMemoryCache {
    fn add(&self, check: &Check, statuses: &[CheckStatus]) -> CacheResult<Option<Uuid>> {
        let key = check.key();
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.checks.insert(key.clone(), check.clone());
        let ring = inner.statuses.entry(key).or_default();
        for status in statuses {
            ring.push_front(status.clone());
        }
        ring.truncate(self.capacity);
        Ok(None)
    }

    fn list_statuses(&self, check_key: &str, limit: usize) -> CacheResult<Vec<CheckStatus>> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        Ok(inner
            .statuses
            .get(check_key)
            .map(|ring| ring.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn get_details(
        &self,
        check_key: &str,
        time: Option<DateTime<Utc>>,
    ) -> CacheResult<Option<serde_json::Value>> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let ring = match inner.statuses.get(check_key) {
            Some(ring) => ring,
            None => return Ok(None),
        };
        let status = match time {
            None => ring.front(),
            Some(t) => ring.iter().find(|s| s.time == t),
        };
        Ok(status.and_then(|s| s.detail.clone()))
    }

    fn remove_canary(&self, canary: &Canary) -> CacheResult<()> {
        let prefix = format!("{}/", canary.id);
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.checks.retain(|key, _| !key.starts_with(&prefix));
        inner.statuses.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    fn remove_check(&self, check_key: &str) -> CacheResult<()> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.checks.remove(check_key);
        inner.statuses.remove(check_key);
        Ok(())
    }
}
