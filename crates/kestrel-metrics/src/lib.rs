//! kestrel-metrics — observability for canary checks.
//!
//! Tracks per-check rolling pass/fail counts and latency samples over a
//! fixed trailing window (1 hour at 1-second resolution), entirely in
//! memory — windows are rebuilt cold after a restart. Point-in-time
//! values are exported through a Prometheus registry owned by the
//! recorder (no process-wide globals, so tests can run isolated
//! instances).
//!
//! # Architecture
//!
//! ```text
//! MetricsRecorder
//!   ├── record(result) ← called per check result
//!   │   ├── RollingWindow × 3 (passed / failed / latency)
//!   │   └── CheckRegistry (counters, gauge, histograms)
//!   └── get(key) → (Uptime, Latency) for dashboards
//! ```

pub mod recorder;
pub mod registry;
pub mod rolling;

pub use recorder::MetricsRecorder;
pub use registry::CheckRegistry;
pub use rolling::RollingWindow;
