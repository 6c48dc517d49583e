//! Error types for relationship reconciliation.

use thiserror::Error;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can occur during relationship reconciliation.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("state store error: {0}")]
    State(#[from] kestrel_state::StateError),
}
