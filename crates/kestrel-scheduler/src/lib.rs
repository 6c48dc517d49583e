//! kestrel-scheduler — dynamic canary scheduling and the run pipeline.
//!
//! The `Scheduler` reconciles the stored set of canary definitions
//! against live recurring jobs: each eligible canary gets one background
//! timer task, replaced when its schedule changes and torn down when the
//! definition disappears. Job bodies dispatch as detached tasks so a slow
//! probe never delays other canaries' fire times.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── sync_jobs() ← periodic reconcile tick
//!   ├── Per-canary job task (timer + shutdown watch)
//!   └── CanaryRunner
//!       ├── ExecutionGuard (per-canary try-lock + debounce)
//!       ├── ProbeRunner → results
//!       ├── CacheChain (memory + durable writes)
//!       ├── check→component reconciliation (Relatable kinds)
//!       ├── transformed-check retirement
//!       ├── MetricsRecorder (rolling windows + Prometheus)
//!       └── StatusEventQueue (bounded, drop-oldest)
//! ```

pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod status;

pub use error::{SchedulerError, SchedulerResult};
pub use guard::ExecutionGuard;
pub use runner::{CanaryRunner, RunOutcome, RunnerConfig, SkipReason};
pub use schedule::Schedule;
pub use scheduler::{IncludeFilters, Scheduler, SyncOutcome};
pub use status::{StatusEvent, StatusEventQueue};
