//! The probe seam.
//!
//! Concrete probe implementations (HTTP, DNS, TCP, ...) live outside this
//! workspace; the scheduler only needs something that can execute a
//! canary's checks and hand back results. Each probe is expected to own
//! its own timeout.

use crate::types::{Canary, CheckResult};

/// Boxed future returned by probe implementations.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Executes all checks of a canary and returns one result per check
/// (plus any transformed results synthesized from parent output).
pub trait ProbeRunner: Send + Sync {
    fn run(&self, canary: Canary) -> BoxFuture<Vec<CheckResult>>;
}
