//! The metrics recorder — folds check results into rolling windows and
//! the Prometheus registry.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use kestrel_core::types::{Canary, CheckResult, Latency, MetricKind, Uptime};

use crate::registry::CheckRegistry;
use crate::rolling::{percentile, RollingWindow};

/// Trailing window span: 1 hour at 1-second resolution.
pub const WINDOW_SECONDS: usize = 3600;

struct CheckWindows {
    passed: RollingWindow,
    failed: RollingWindow,
    latency: RollingWindow,
}

impl CheckWindows {
    fn new() -> Self {
        Self {
            passed: RollingWindow::new(WINDOW_SECONDS),
            failed: RollingWindow::new(WINDOW_SECONDS),
            latency: RollingWindow::new(WINDOW_SECONDS),
        }
    }

    fn reduce(&self, now_epoch: i64) -> (Uptime, Latency) {
        let uptime = Uptime {
            passed: self.passed.sum(now_epoch) as u64,
            failed: self.failed.sum(now_epoch) as u64,
        };
        let latency = Latency {
            p95_ms: percentile(&self.latency.values(now_epoch), 95.0),
        };
        (uptime, latency)
    }
}

/// Rolling per-check windows plus the Prometheus registry.
///
/// Windows are keyed by `{canary_id}/{kind}/{name}` and created lazily on
/// first record; they are in-memory only and start cold after a restart.
pub struct MetricsRecorder {
    windows: Mutex<HashMap<String, CheckWindows>>,
    registry: CheckRegistry,
}

impl MetricsRecorder {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            windows: Mutex::new(HashMap::new()),
            registry: CheckRegistry::new()?,
        })
    }

    /// The Prometheus registry fed by this recorder.
    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Fold one result into the rolling windows and the registry.
    /// Returns the check's rolling (uptime, latency) after the fold.
    pub fn record(
        &self,
        canary: &Canary,
        result: &CheckResult,
        now_epoch: i64,
    ) -> (Uptime, Latency) {
        let key = format!("{}/{}/{}", canary.id, result.check.kind, result.check.name);
        let labels = [
            result.check.kind.as_str(),
            result.check.name.as_str(),
            canary.namespace.as_str(),
            canary.spec.owner.as_str(),
            canary.spec.severity.as_str(),
        ];

        self.registry.runs_total.with_label_values(&labels).inc();
        if result.duration_ms > 0 {
            self.registry
                .duration_ms
                .with_label_values(&labels)
                .observe(result.duration_ms as f64);
        }

        if result.pass {
            self.registry.failing.with_label_values(&labels).set(0);
            self.registry.success_total.with_label_values(&labels).inc();
            // Touch the fail counter too, so uptime queries always find
            // both series.
            self.registry
                .failed_total
                .with_label_values(&labels)
                .inc_by(0);
            for metric in &result.metrics {
                let generic = [
                    result.check.kind.as_str(),
                    metric.name.as_str(),
                    canary.namespace.as_str(),
                ];
                match metric.kind {
                    MetricKind::Counter => self
                        .registry
                        .generic_counter
                        .with_label_values(&generic)
                        .inc_by(metric.value),
                    MetricKind::Gauge => self
                        .registry
                        .generic_gauge
                        .with_label_values(&generic)
                        .set(metric.value),
                    MetricKind::Histogram => self
                        .registry
                        .generic_histogram
                        .with_label_values(&generic)
                        .observe(metric.value),
                }
            }
        } else {
            self.registry.failing.with_label_values(&labels).set(1);
            self.registry.failed_total.with_label_values(&labels).inc();
        }

        let mut windows = self.windows.lock().expect("metrics lock poisoned");
        let check_windows = windows.entry(key).or_insert_with(CheckWindows::new);
        if result.pass {
            check_windows.passed.append(now_epoch, 1.0);
        } else {
            check_windows.failed.append(now_epoch, 1.0);
        }
        if result.duration_ms > 0 {
            check_windows
                .latency
                .append(now_epoch, result.duration_ms as f64);
        }
        check_windows.reduce(now_epoch)
    }

    /// Current rolling (uptime, latency) for a check key, if tracked.
    pub fn get(&self, check_key: &str, now_epoch: i64) -> Option<(Uptime, Latency)> {
        let windows = self.windows.lock().expect("metrics lock poisoned");
        windows.get(check_key).map(|w| w.reduce(now_epoch))
    }

    /// Drop the rolling windows for every check of a canary.
    pub fn remove_canary(&self, canary: &Canary) {
        let prefix = format!("{}/", canary.id);
        let mut windows = self.windows.lock().expect("metrics lock poisoned");
        windows.retain(|key, _| !key.starts_with(&prefix));
        debug!(canary = %canary.id, "rolling windows dropped");
    }

    /// Number of check keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.lock().expect("metrics lock poisoned").len()
    }
}
