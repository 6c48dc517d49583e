//! kestrel-state — embedded state store for Kestrel.
//!
//! Backed by [redb](https://docs.rs/redb), persists canaries, checks,
//! check statuses, components, config items, relationship rows, and job
//! history.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{canary_id}:{check_id}`, `{check_id}:{time}`) enable
//! prefix and range scans for related records. Status times are encoded
//! fixed-width so the natural (check id, time) key sorts chronologically.
//!
//! Deletion is soft throughout: rows gain a `deleted_at` tombstone and are
//! retained for history. Relationship rows are an append-only arena per
//! (parent, child) pair with at most one live entry.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use tables::RelationKind;
