//! The execution guard — per-canary mutual exclusion and debounce.
//!
//! Each canary id owns a lazily created, permanently retained lock. A run
//! attempts a non-blocking acquire; failure means a run is already in
//! flight and the dispatch becomes a silent skip. Separately, a last-run
//! timestamp enforces a minimum interval between runs: an early dispatch
//! is skipped, not deferred.
//!
//! The lock map only grows. Locks are never removed, an accepted bounded
//! leak given canary cardinality.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use uuid::Uuid;

/// Default minimum interval between two runs of the same canary.
pub const MIN_TIME_BETWEEN_RUNS: Duration = Duration::from_secs(10);

/// Per-canary run exclusivity and debounce state.
pub struct ExecutionGuard {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    last_runs: Mutex<HashMap<Uuid, Instant>>,
    min_interval: Duration,
}

impl ExecutionGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            last_runs: Mutex::new(HashMap::new()),
            min_interval,
        }
    }

    /// Try to acquire the canary's run lock without blocking.
    ///
    /// Returns `None` when a run is already in flight; the guard is
    /// released when the returned handle drops.
    pub fn try_acquire(&self, canary_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().expect("guard lock poisoned");
            locks
                .entry(canary_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.try_lock_owned().ok()
    }

    /// Whether enough time has passed since the canary's last run.
    pub fn past_min_interval(&self, canary_id: Uuid) -> bool {
        let last_runs = self.last_runs.lock().expect("guard lock poisoned");
        match last_runs.get(&canary_id) {
            Some(last) => last.elapsed() >= self.min_interval,
            None => true,
        }
    }

    /// Record that the canary ran just now.
    pub fn mark_ran(&self, canary_id: Uuid) {
        let mut last_runs = self.last_runs.lock().expect("guard lock poisoned");
        last_runs.insert(canary_id, Instant::now());
    }

    /// Number of lock entries ever created (the map only grows).
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().expect("guard lock poisoned").len()
    }
}

impl Default for ExecutionGuard {
    fn default() -> Self {
        Self::new(MIN_TIME_BETWEEN_RUNS)
    }
}
