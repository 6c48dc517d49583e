//! The canary run pipeline.
//!
//! One `run` call executes a canary end to end: guard acquisition,
//! probe execution, result persistence through the cache chain,
//! check→component reconciliation, transformed-check retirement, metrics
//! recording, and the canary-level status event. Failures of individual
//! steps are recorded into the canary's own job history and never abort
//! the remaining results.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use kestrel_cache::CacheChain;
use kestrel_core::types::{Check, CheckStatus, JobHistory, Latency, Uptime};
use kestrel_core::ProbeRunner;
use kestrel_metrics::MetricsRecorder;
use kestrel_state::StateStore;
use kestrel_topology::sync_check_relationships;

use crate::error::{SchedulerError, SchedulerResult};
use crate::guard::{ExecutionGuard, MIN_TIME_BETWEEN_RUNS};
use crate::lifecycle::retire_transformed;
use crate::status::{summarize, CheckStatusSummary, StatusEvent, StatusEventQueue};

/// Why a dispatched run did not execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run of the same canary is in flight.
    AlreadyRunning,
    /// The minimum inter-run interval has not elapsed.
    Debounced,
    /// The canary is soft-deleted.
    Deleted,
}

/// Outcome of one dispatched run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { results: usize },
    Skipped(SkipReason),
}

/// Tunables for the run pipeline.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Minimum interval between two runs of the same canary.
    pub min_interval: Duration,
    /// Transformed-check kinds with independent lifecycles, excluded
    /// from retirement.
    pub transform_exclusions: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            min_interval: MIN_TIME_BETWEEN_RUNS,
            transform_exclusions: Vec::new(),
        }
    }
}

/// Executes canary runs against the probe runner and fans results into
/// the cache chain, metrics, relationships, and the status stream.
pub struct CanaryRunner {
    store: StateStore,
    chain: Arc<CacheChain>,
    metrics: Arc<MetricsRecorder>,
    events: Arc<StatusEventQueue>,
    probes: Arc<dyn ProbeRunner>,
    guard: ExecutionGuard,
    transform_exclusions: Vec<String>,
}

impl CanaryRunner {
    pub fn new(
        store: StateStore,
        chain: Arc<CacheChain>,
        metrics: Arc<MetricsRecorder>,
        events: Arc<StatusEventQueue>,
        probes: Arc<dyn ProbeRunner>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            chain,
            metrics,
            events,
            probes,
            guard: ExecutionGuard::new(config.min_interval),
            transform_exclusions: config.transform_exclusions,
        }
    }

    /// The execution guard (for inspection and tests).
    pub fn guard(&self) -> &ExecutionGuard {
        &self.guard
    }

    /// Execute one canary run.
    ///
    /// At most one run per canary executes at a time; an overlapping or
    /// too-early dispatch is skipped, not deferred.
    pub async fn run(&self, canary_id: Uuid) -> SchedulerResult<RunOutcome> {
        let canary = self
            .store
            .get_canary(canary_id)?
            .ok_or_else(|| SchedulerError::CanaryNotFound(canary_id.to_string()))?;
        if canary.deleted_at.is_some() {
            return Ok(RunOutcome::Skipped(SkipReason::Deleted));
        }

        let _held = match self.guard.try_acquire(canary_id) {
            Some(held) => held,
            None => {
                debug!(canary = %canary.qualified_name(), "run already in flight, skipping");
                return Ok(RunOutcome::Skipped(SkipReason::AlreadyRunning));
            }
        };
        if !self.guard.past_min_interval(canary_id) {
            debug!(canary = %canary.qualified_name(), "ran too recently, skipping");
            return Ok(RunOutcome::Skipped(SkipReason::Debounced));
        }

        let started = tokio::time::Instant::now();

        // Snapshots taken before the run: the transformed checks that
        // already exist, and each check's latest recorded pass/fail for
        // transition detection.
        let existed_before = self
            .store
            .list_transformed_checks(canary_id, &self.transform_exclusions)?;
        let mut prior_status: HashMap<(String, String), bool> = HashMap::new();
        for check in self.store.list_checks(canary_id)? {
            if let Some(status) = self.store.latest_status(check.id)? {
                prior_status.insert((check.kind, check.name), status.status);
            }
        }

        let results = self.probes.run(canary.clone()).await;

        let mut history = JobHistory::new("canary", "canary", &canary_id.to_string(), Utc::now());
        let mut created_transformed: Vec<Uuid> = Vec::new();
        let mut check_statuses: HashMap<Uuid, CheckStatusSummary> = HashMap::new();
        let mut messages = Vec::new();
        let mut errors = Vec::new();
        let mut uptime_agg = Uptime::default();
        let mut highest_latency = Latency::default();
        let mut pass = true;
        let mut transitioned = false;

        for result in &results {
            let now = Utc::now();
            let candidate = Check::from_result(&canary, result, now);
            let status = CheckStatus {
                check_id: candidate.id,
                time: now,
                status: result.pass,
                invalid: result.invalid,
                duration_ms: result.duration_ms,
                message: result.message.clone(),
                error: result.error.clone(),
                detail: result.detail.clone(),
            };

            let check_id = match self.chain.add(&candidate, &[status]) {
                Ok(id) => id,
                Err(e) => {
                    error!(check = %result.check.name, error = %e, "failed to persist result");
                    history.errors.push(format!("{}: {e}", result.check.name));
                    continue;
                }
            };
            if result.transformed {
                created_transformed.push(check_id);
            }

            // Relationship extraction for check kinds that support it.
            if let Err(e) = sync_check_relationships(&self.store, check_id, &result.check, now) {
                warn!(check = %result.check.name, error = %e, "relationship reconciliation failed");
                history.errors.push(format!("{}: {e}", result.check.name));
            }

            let (uptime, latency) = self.metrics.record(&canary, result, now.timestamp());

            let key = (result.check.kind.clone(), result.check.name.clone());
            let check_transitioned = match prior_status.get(&key) {
                None => true,
                Some(previous) => *previous != result.pass,
            };
            transitioned |= check_transitioned;

            uptime_agg.add(uptime);
            if latency.p95_ms > highest_latency.p95_ms {
                highest_latency = latency;
            }
            check_statuses.insert(
                check_id,
                CheckStatusSummary {
                    uptime,
                    latency,
                    transitioned: check_transitioned,
                },
            );

            if !result.message.is_empty() {
                messages.push(result.message.clone());
            }
            if !result.error.is_empty() {
                errors.push(result.error.clone());
            }
            pass &= result.pass;
            history.success_count += 1;
        }

        self.events.push(StatusEvent {
            canary_id,
            canary_name: canary.name.clone(),
            namespace: canary.namespace.clone(),
            pass,
            message: summarize(&messages),
            error_message: summarize(&errors),
            uptime: uptime_agg,
            latency: highest_latency,
            check_statuses,
            transitioned,
            time: Utc::now(),
        });

        if let Err(e) = retire_transformed(
            &self.store,
            canary_id,
            &existed_before,
            &created_transformed,
            Utc::now(),
        ) {
            error!(canary = %canary.qualified_name(), error = %e, "transformed-check retirement failed");
            history.errors.push(e.to_string());
        }

        self.guard.mark_ran(canary_id);

        history.duration_ms = started.elapsed().as_millis() as u64;
        if history.success_count > 0 || !history.errors.is_empty() {
            if let Err(e) = self.store.put_job_history(&history) {
                warn!(canary = %canary_id, error = %e, "failed to persist job history");
            }
        }

        Ok(RunOutcome::Completed {
            results: results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use kestrel_core::types::{Canary, CanarySpec, CheckResult, CheckSpec, DeleteStrategy};
    use kestrel_core::BoxFuture;

    /// Probe stub: pops a scripted result set per run, falling back to a
    /// single passing result.
    struct StubProbe {
        calls: AtomicUsize,
        scripted: Mutex<VecDeque<Vec<CheckResult>>>,
        delay: Duration,
    }

    impl StubProbe {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                scripted: Mutex::new(VecDeque::new()),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new()
            }
        }

        fn script(&self, results: Vec<CheckResult>) {
            self.scripted.lock().unwrap().push_back(results);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProbeRunner for StubProbe {
        fn run(&self, _canary: Canary) -> BoxFuture<Vec<CheckResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let results = self
                .scripted
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| vec![CheckResult::passing(CheckSpec::new("http", "api"))]);
            let delay = self.delay;
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                results
            })
        }
    }

    struct Fixture {
        store: StateStore,
        runner: Arc<CanaryRunner>,
        probe: Arc<StubProbe>,
        events: Arc<StatusEventQueue>,
        canary: Canary,
    }

    fn fixture_with(probe: StubProbe, config: RunnerConfig) -> Fixture {
        let store = StateStore::open_in_memory().unwrap();
        let probe = Arc::new(probe);
        let events = Arc::new(StatusEventQueue::default());
        let runner = Arc::new(CanaryRunner::new(
            store.clone(),
            Arc::new(CacheChain::new(store.clone(), 100)),
            Arc::new(MetricsRecorder::new().unwrap()),
            events.clone(),
            probe.clone(),
            config,
        ));

        let canary = Canary {
            id: Uuid::new_v4(),
            namespace: "default".to_string(),
            name: "api".to_string(),
            labels: Default::default(),
            spec: CanarySpec {
                schedule: "@every 30s".to_string(),
                ..CanarySpec::default()
            },
            agent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        store.put_canary(&canary).unwrap();

        Fixture {
            store,
            runner,
            probe,
            events,
            canary,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StubProbe::new(), RunnerConfig::default())
    }

    fn transformed_result(name: &str) -> CheckResult {
        let mut spec = CheckSpec::new("http", name);
        spec.transform_delete_strategy = DeleteStrategy::MarkUnhealthy;
        let mut result = CheckResult::passing(spec);
        result.transformed = true;
        result
    }

    #[tokio::test(start_paused = true)]
    async fn run_persists_results() {
        let f = fixture();
        let outcome = f.runner.run(f.canary.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { results: 1 });

        let checks = f.store.list_checks(f.canary.id).unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(f.store.count_statuses(checks[0].id).unwrap(), 1);
        // Run history was recorded against the canary.
        let history = f
            .store
            .list_job_history(&f.canary.id.to_string(), 10)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_runs_never_overlap() {
        let f = fixture_with(
            StubProbe::slow(Duration::from_millis(200)),
            RunnerConfig::default(),
        );
        let id = f.canary.id;

        let first = tokio::spawn({
            let runner = f.runner.clone();
            async move { runner.run(id).await.unwrap() }
        });
        // Let the first run reach the probe await while holding the lock.
        tokio::task::yield_now().await;

        let second = f.runner.run(id).await.unwrap();
        assert_eq!(second, RunOutcome::Skipped(SkipReason::AlreadyRunning));

        let first = first.await.unwrap();
        assert_eq!(first, RunOutcome::Completed { results: 1 });
        // The probe only ever ran once.
        assert_eq!(f.probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_inside_min_interval_are_debounced() {
        let f = fixture();
        let id = f.canary.id;

        assert!(matches!(
            f.runner.run(id).await.unwrap(),
            RunOutcome::Completed { .. }
        ));
        assert_eq!(
            f.runner.run(id).await.unwrap(),
            RunOutcome::Skipped(SkipReason::Debounced)
        );

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matches!(
            f.runner.run(id).await.unwrap(),
            RunOutcome::Completed { .. }
        ));
        assert_eq!(f.probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_canary_is_skipped() {
        let f = fixture();
        f.store
            .soft_delete_canary(f.canary.id, Utc::now())
            .unwrap();

        assert_eq!(
            f.runner.run(f.canary.id).await.unwrap(),
            RunOutcome::Skipped(SkipReason::Deleted)
        );
        assert_eq!(f.probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transformed_fanout_is_garbage_collected() {
        let f = fixture();
        let id = f.canary.id;
        let parent = CheckResult::passing(CheckSpec::new("http", "parent"));

        // Run 1 synthesizes X and Y.
        f.probe.script(vec![
            parent.clone(),
            transformed_result("pod-x"),
            transformed_result("pod-y"),
        ]);
        f.runner.run(id).await.unwrap();
        assert_eq!(f.store.list_transformed_checks(id, &[]).unwrap().len(), 2);

        // Run 2 only recreates X: Y is retired per its strategy.
        tokio::time::advance(Duration::from_secs(11)).await;
        f.probe
            .script(vec![parent.clone(), transformed_result("pod-x")]);
        f.runner.run(id).await.unwrap();

        let live = f.store.list_transformed_checks(id, &[]).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name, "pod-x");

        let retired = f
            .store
            .list_checks(id)
            .unwrap()
            .into_iter()
            .find(|c| c.name == "pod-y")
            .unwrap();
        assert!(retired.deleted_at.is_some());
        // Terminal status per the mark-unhealthy strategy, history intact.
        let terminal = f.store.latest_status(retired.id).unwrap().unwrap();
        assert!(!terminal.status);
        assert!(f.store.count_statuses(retired.id).unwrap() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_transformed_run_retires_nothing() {
        let f = fixture();
        let id = f.canary.id;
        let parent = CheckResult::passing(CheckSpec::new("http", "parent"));

        f.probe
            .script(vec![parent.clone(), transformed_result("pod-x")]);
        f.runner.run(id).await.unwrap();

        // Run 2 produces no transformed checks at all.
        tokio::time::advance(Duration::from_secs(11)).await;
        f.probe.script(vec![parent.clone()]);
        f.runner.run(id).await.unwrap();

        assert_eq!(f.store.list_transformed_checks(id, &[]).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transition_flag_tracks_status_flips() {
        let f = fixture();
        let id = f.canary.id;
        let passing = CheckResult::passing(CheckSpec::new("http", "api"));
        let failing = CheckResult::failing(CheckSpec::new("http", "api"), "connection refused");

        // First ever status: a transition by definition.
        f.probe.script(vec![passing.clone()]);
        f.runner.run(id).await.unwrap();
        assert!(f.events.pop().unwrap().transitioned);

        // Same status again: no transition.
        tokio::time::advance(Duration::from_secs(11)).await;
        f.probe.script(vec![passing.clone()]);
        f.runner.run(id).await.unwrap();
        assert!(!f.events.pop().unwrap().transitioned);

        // Flip to failing: transition, and the event carries the error.
        tokio::time::advance(Duration::from_secs(11)).await;
        f.probe.script(vec![failing]);
        f.runner.run(id).await.unwrap();
        let event = f.events.pop().unwrap();
        assert!(event.transitioned);
        assert!(!event.pass);
        assert_eq!(event.error_message, "connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn event_messages_are_summarized() {
        let f = fixture();
        let mut one = CheckResult::passing(CheckSpec::new("http", "a"));
        one.message = "first".to_string();
        let mut two = CheckResult::passing(CheckSpec::new("http", "b"));
        two.message = "second".to_string();
        let mut three = CheckResult::passing(CheckSpec::new("http", "c"));
        three.message = "third".to_string();
        f.probe.script(vec![one, two, three]);

        f.runner.run(f.canary.id).await.unwrap();
        let event = f.events.pop().unwrap();
        assert_eq!(event.message, "first, (2 more)");
        assert_eq!(event.check_statuses.len(), 3);
    }
}
