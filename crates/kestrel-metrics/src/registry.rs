//! Prometheus metric families for check results.
//!
//! Each recorder owns its own `Registry`, so isolated instances can run
//! side by side in tests. Families mirror what monitoring stacks expect
//! from a canary runner: run/success/fail counters, a pass-fail gauge,
//! a duration histogram, and generic families for probe-supplied custom
//! metrics.

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

const CHECK_LABELS: &[&str] = &["kind", "name", "namespace", "owner", "severity"];
const GENERIC_LABELS: &[&str] = &["kind", "metric", "namespace"];

/// Prometheus families for canary check results.
pub struct CheckRegistry {
    registry: Registry,
    pub runs_total: IntCounterVec,
    pub success_total: IntCounterVec,
    pub failed_total: IntCounterVec,
    /// 0 = passing, 1 = failing.
    pub failing: IntGaugeVec,
    pub duration_ms: HistogramVec,
    pub generic_counter: CounterVec,
    pub generic_gauge: GaugeVec,
    pub generic_histogram: HistogramVec,
}

impl CheckRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let runs_total = IntCounterVec::new(
            Opts::new("canary_check_count", "The total number of checks"),
            CHECK_LABELS,
        )?;
        let success_total = IntCounterVec::new(
            Opts::new(
                "canary_check_success_count",
                "The total number of successful checks",
            ),
            CHECK_LABELS,
        )?;
        let failed_total = IntCounterVec::new(
            Opts::new(
                "canary_check_failed_count",
                "The total number of failed checks",
            ),
            CHECK_LABELS,
        )?;
        let failing = IntGaugeVec::new(
            Opts::new(
                "canary_check",
                "A gauge representing check success (0) or failure (1)",
            ),
            CHECK_LABELS,
        )?;
        let duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "canary_check_duration",
                "A histogram of the response latency in milliseconds",
            )
            .buckets(vec![
                5.0, 10.0, 25.0, 50.0, 200.0, 500.0, 1000.0, 3000.0, 10000.0, 30000.0,
            ]),
            CHECK_LABELS,
        )?;
        let generic_counter = CounterVec::new(
            Opts::new("canary_check_counter", "Probe-supplied counters"),
            GENERIC_LABELS,
        )?;
        let generic_gauge = GaugeVec::new(
            Opts::new("canary_check_gauge", "Probe-supplied gauges"),
            GENERIC_LABELS,
        )?;
        let generic_histogram = HistogramVec::new(
            HistogramOpts::new("canary_check_histogram", "Probe-supplied histograms").buckets(
                vec![
                    5.0, 10.0, 25.0, 50.0, 200.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 20000.0,
                ],
            ),
            GENERIC_LABELS,
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(success_total.clone()))?;
        registry.register(Box::new(failed_total.clone()))?;
        registry.register(Box::new(failing.clone()))?;
        registry.register(Box::new(duration_ms.clone()))?;
        registry.register(Box::new(generic_counter.clone()))?;
        registry.register(Box::new(generic_gauge.clone()))?;
        registry.register(Box::new(generic_histogram.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            success_total,
            failed_total,
            failing,
            duration_ms,
            generic_counter,
            generic_gauge,
            generic_histogram,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_register_and_render() {
        let registry = CheckRegistry::new().unwrap();
        registry
            .runs_total
            .with_label_values(&["http", "api", "default", "platform", "critical"])
            .inc();
        registry
            .failing
            .with_label_values(&["http", "api", "default", "platform", "critical"])
            .set(0);

        let rendered = registry.render();
        assert!(rendered.contains("canary_check_count"));
        assert!(rendered.contains("kind=\"http\""));
    }

    #[test]
    fn instances_are_isolated() {
        let a = CheckRegistry::new().unwrap();
        let b = CheckRegistry::new().unwrap();
        a.runs_total
            .with_label_values(&["http", "api", "default", "", ""])
            .inc();
        assert!(!b.render().contains("name=\"api\""));
    }
}
