//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("canary not found: {0}")]
    CanaryNotFound(String),

    #[error("invalid schedule {expr:?}: {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("state store error: {0}")]
    State(#[from] kestrel_state::StateError),

    #[error("cache error: {0}")]
    Cache(#[from] kestrel_cache::CacheError),

    #[error("reconciliation error: {0}")]
    Topology(#[from] kestrel_topology::TopologyError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
