//! The dynamic scheduler — reconciles canary definitions to live jobs.
//!
//! `sync_jobs` is the single writer of the job map: it registers timer
//! tasks for newly eligible canaries, replaces tasks whose schedule
//! changed, leaves unchanged jobs untouched (preserving their next-fire
//! time), and tears down jobs whose definitions were deleted, filtered
//! out, or set to `@never`. A per-canary failure is recorded against that
//! canary's own history and never aborts the batch; only a failure to
//! read the definition list aborts the tick.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kestrel_core::types::{Canary, JobHistory, NEVER_SCHEDULE};
use kestrel_core::matchers;
use kestrel_state::StateStore;

use crate::error::SchedulerResult;
use crate::runner::CanaryRunner;
use crate::schedule::Schedule;

/// How soon a brand-new job's first fire must be for the scheduler to
/// run it immediately instead of waiting out the first period.
pub const CATCH_UP_HORIZON: Duration = Duration::from_secs(3600);

/// Namespace/name/label glob inclusion filters for eligibility.
///
/// Empty lists include everything.
#[derive(Debug, Clone, Default)]
pub struct IncludeFilters {
    pub namespaces: Vec<String>,
    pub names: Vec<String>,
    /// `key=value` patterns; a bare key requires presence.
    pub labels: Vec<String>,
}

impl IncludeFilters {
    /// Whether a canary falls outside the inclusion filters.
    pub fn ignores(&self, canary: &Canary) -> bool {
        !matchers::match_any(&canary.namespace, &self.namespaces)
            || !matchers::match_any(&canary.name, &self.names)
            || !matchers::match_labels(&canary.labels, &self.labels)
    }
}

/// Tallies from one `sync_jobs` tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub scheduled: u32,
    pub rescheduled: u32,
    pub unchanged: u32,
    pub unscheduled: u32,
    pub failed: u32,
}

/// A live recurring job registration.
struct JobSlot {
    schedule: String,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Reconciles stored canary definitions against live recurring jobs.
pub struct Scheduler {
    store: StateStore,
    runner: Arc<CanaryRunner>,
    /// Live jobs; written only by the sync tick.
    jobs: Mutex<HashMap<Uuid, JobSlot>>,
    /// Every canary id ever registered, for first-registration catch-up.
    ever_scheduled: Mutex<HashSet<Uuid>>,
    filters: IncludeFilters,
    catch_up_horizon: Duration,
}

impl Scheduler {
    pub fn new(store: StateStore, runner: Arc<CanaryRunner>, filters: IncludeFilters) -> Self {
        Self {
            store,
            runner,
            jobs: Mutex::new(HashMap::new()),
            ever_scheduled: Mutex::new(HashSet::new()),
            filters,
            catch_up_horizon: CATCH_UP_HORIZON,
        }
    }

    /// Reconcile all stored definitions against the live job set.
    pub fn sync_jobs(&self) -> SchedulerResult<SyncOutcome> {
        // A store-read failure aborts only this tick.
        let canaries = self.store.list_canaries()?;
        debug!(canaries = canaries.len(), "syncing canary jobs");

        let mut outcome = SyncOutcome::default();
        let mut eligible_ids = HashSet::new();

        for canary in canaries {
            let id = canary.id;
            let schedule_expr = canary.effective_schedule();

            let eligible = canary.deleted_at.is_none()
                && !self.filters.ignores(&canary)
                && schedule_expr != NEVER_SCHEDULE;
            if !eligible {
                if self.unschedule(id) {
                    outcome.unscheduled += 1;
                }
                continue;
            }

            let schedule = match Schedule::parse(&schedule_expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    // Malformed schedule: the canary stays unscheduled and
                    // the error lands in its own history.
                    warn!(canary = %canary.qualified_name(), error = %e, "bad schedule, leaving unscheduled");
                    self.record_entity_error(id, &e.to_string());
                    self.unschedule(id);
                    outcome.failed += 1;
                    continue;
                }
            };
            eligible_ids.insert(id);

            let existing_schedule = {
                let jobs = self.jobs.lock().expect("job map lock poisoned");
                jobs.get(&id).map(|slot| slot.schedule.clone())
            };
            match existing_schedule {
                Some(existing) if existing == schedule_expr => {
                    // Unchanged: keep the running task and its next-fire time.
                    outcome.unchanged += 1;
                }
                Some(_) => {
                    self.unschedule(id);
                    let slot = self.register(id, &schedule_expr, &schedule, false);
                    let mut jobs = self.jobs.lock().expect("job map lock poisoned");
                    jobs.insert(id, slot);
                    debug!(canary = %canary.qualified_name(), schedule = %schedule_expr, "rescheduled");
                    outcome.rescheduled += 1;
                }
                None => {
                    let first_ever = self
                        .ever_scheduled
                        .lock()
                        .expect("seen set lock poisoned")
                        .insert(id);
                    let slot = self.register(id, &schedule_expr, &schedule, first_ever);
                    let mut jobs = self.jobs.lock().expect("job map lock poisoned");
                    jobs.insert(id, slot);
                    debug!(canary = %canary.qualified_name(), schedule = %schedule_expr, "scheduled");
                    outcome.scheduled += 1;
                }
            }
        }

        // Definitions that vanished entirely still hold registrations.
        let stale: Vec<Uuid> = {
            let jobs = self.jobs.lock().expect("job map lock poisoned");
            jobs.keys()
                .filter(|id| !eligible_ids.contains(id))
                .copied()
                .collect()
        };
        for id in stale {
            if self.unschedule(id) {
                outcome.unscheduled += 1;
            }
        }

        Ok(outcome)
    }

    /// Register the recurring timer task for one canary.
    fn register(
        &self,
        canary_id: Uuid,
        schedule_expr: &str,
        schedule: &Schedule,
        first_ever: bool,
    ) -> JobSlot {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = self.runner.clone();
        let job_schedule = schedule.clone();
        let handle = tokio::spawn(run_job_loop(runner, canary_id, job_schedule, shutdown_rx));

        // First-ever registration with a near fire: run now rather than
        // waiting out a full period.
        if first_ever {
            let now = Utc::now();
            let near = schedule
                .next_fire(now)
                .and_then(|next| (next - now).to_std().ok())
                .is_some_and(|delay| delay <= self.catch_up_horizon);
            if near {
                dispatch_run(self.runner.clone(), canary_id);
            }
        }

        JobSlot {
            schedule: schedule_expr.to_string(),
            shutdown_tx,
            handle,
        }
    }

    /// Tear down a canary's registration. An in-flight run completes and
    /// writes its final status; only the recurring timer is removed.
    pub fn unschedule(&self, canary_id: Uuid) -> bool {
        let slot = {
            let mut jobs = self.jobs.lock().expect("job map lock poisoned");
            jobs.remove(&canary_id)
        };
        match slot {
            Some(slot) => {
                let _ = slot.shutdown_tx.send(true);
                slot.handle.abort();
                debug!(%canary_id, "job unscheduled");
                true
            }
            None => false,
        }
    }

    /// One-off run at a target time: immediate when the time is past,
    /// otherwise a self-removing single-fire timer.
    pub fn trigger_at(&self, canary_id: Uuid, at: DateTime<Utc>) {
        let runner = self.runner.clone();
        tokio::spawn(async move {
            let now = Utc::now();
            if let Ok(delay) = (at - now).to_std() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = runner.run(canary_id).await {
                error!(%canary_id, error = %e, "one-off run failed");
            }
        });
    }

    /// Force a deregister/re-register for one canary (explicit override),
    /// regardless of whether its schedule changed.
    pub fn reschedule(&self, canary_id: Uuid) -> SchedulerResult<()> {
        self.unschedule(canary_id);
        self.sync_jobs().map(|_| ())
    }

    /// Run the periodic sync loop until shutdown.
    pub async fn run_sync_loop(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "scheduler sync loop started");
        // Reconcile once up front, then on the interval.
        if let Err(e) = self.sync_jobs() {
            error!(error = %e, "job sync failed");
        }
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sync_jobs() {
                        // Aborts only this tick; the next one retries.
                        error!(error = %e, "job sync failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler sync loop shutting down");
                    break;
                }
            }
        }
        self.shutdown_all();
    }

    /// Tear down every registration (for graceful shutdown).
    pub fn shutdown_all(&self) {
        let mut jobs = self.jobs.lock().expect("job map lock poisoned");
        for (id, slot) in jobs.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(canary_id = %id, "job stopped");
        }
        info!("all canary jobs stopped");
    }

    /// Canary ids with live registrations.
    pub fn scheduled_ids(&self) -> Vec<Uuid> {
        let jobs = self.jobs.lock().expect("job map lock poisoned");
        jobs.keys().copied().collect()
    }

    /// Whether a canary currently has a live registration.
    pub fn is_scheduled(&self, canary_id: Uuid) -> bool {
        let jobs = self.jobs.lock().expect("job map lock poisoned");
        jobs.contains_key(&canary_id)
    }

    fn record_entity_error(&self, canary_id: Uuid, message: &str) {
        let mut history = JobHistory::new("sync", "canary", &canary_id.to_string(), Utc::now());
        history.errors.push(message.to_string());
        if let Err(e) = self.store.put_job_history(&history) {
            warn!(%canary_id, error = %e, "failed to persist sync error");
        }
    }
}

/// The timer loop for one registered job.
async fn run_job_loop(
    runner: Arc<CanaryRunner>,
    canary_id: Uuid,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let next = match schedule.next_fire(now) {
            Some(next) => next,
            None => break,
        };
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                dispatch_run(runner.clone(), canary_id);
            }
            _ = shutdown.changed() => {
                debug!(%canary_id, "job loop shutting down");
                break;
            }
        }
    }
}

/// Dispatch one run as a detached task so a slow probe never delays the
/// job's own timer or other canaries.
fn dispatch_run(runner: Arc<CanaryRunner>, canary_id: Uuid) {
    tokio::spawn(async move {
        if let Err(e) = runner.run(canary_id).await {
            error!(%canary_id, error = %e, "canary run failed");
        }
    });
}
