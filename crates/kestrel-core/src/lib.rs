//! kestrel-core — shared domain types for Kestrel.
//!
//! Defines the canary/check data model, probe results, label selectors,
//! and the seams the rest of the workspace plugs into:
//!
//! - `ProbeRunner` — executes a canary's checks, returns results
//! - `Relatable` — capability trait for check kinds that expose
//!   relationship selectors
//!
//! All persisted types are serde-serializable; composite table keys
//! (`{canary_id}:{check_id}`, `{check_id}:{time}`) enable prefix scans
//! in the state store.

pub mod duration;
pub mod matchers;
pub mod runner;
pub mod types;

pub use duration::parse_duration;
pub use runner::{BoxFuture, ProbeRunner};
pub use types::*;
