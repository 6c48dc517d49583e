//! Error types for the result cache.

use thiserror::Error;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur in the cache chain.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("state store error: {0}")]
    State(#[from] kestrel_state::StateError),

    #[error("invalid time expression: {0}")]
    TimeExpr(String),

    #[error("check not found: {0}")]
    CheckNotFound(String),
}
