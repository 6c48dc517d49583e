//! kestrel-topology — selector-based relationship reconciliation.
//!
//! One generic diff algorithm keeps the three relationship kinds
//! consistent as selectors and their matches change between ticks:
//!
//! - check → component, extracted during a canary run for check kinds
//!   that expose the `Relatable` capability
//! - component → config item, reconciled on a periodic per-component tick
//! - component → component, reconciled on the same tick
//!
//! The algorithm is idempotent and history-preserving: superseded and
//! vanished rows are tombstoned, never hard-deleted, and a row whose
//! selector id is unchanged is left untouched.

pub mod drivers;
pub mod error;
pub mod reconcile;

pub use drivers::{sync_check_relationships, sync_component_relationships, sync_components};
pub use error::{TopologyError, TopologyResult};
pub use reconcile::{reconcile, ReconcileOutcome, SelectorMatch};
