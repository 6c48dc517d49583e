//! The generic selector-diff algorithm.
//!
//! Given a parent and its current selector-derived match set, bring the
//! relationship table in line:
//!
//! 1. live row, same selector id → stable, untouched
//! 2. live row, same child, stale selector id → tombstone + fresh row
//!    (re-attributed provenance)
//! 3. no row for the child → insert
//! 4. previously-live child absent from the matches → tombstone
//!
//! Each row operation is independent: a failure is logged and counted,
//! and never rolls back sibling rows.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use kestrel_state::{RelationKind, StateStore};

use crate::error::TopologyResult;

/// One selector-derived match: a child entity tagged with the id of the
/// selector that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorMatch {
    pub child_id: Uuid,
    pub selector_id: String,
}

/// Row-level tallies from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub stable: u32,
    pub inserted: u32,
    pub reattributed: u32,
    pub tombstoned: u32,
    pub failed: u32,
}

/// Reconcile a parent's live relationship rows against its current match
/// set. Idempotent: running twice with the same matches is a no-op.
pub fn reconcile(
    store: &StateStore,
    kind: RelationKind,
    parent_id: Uuid,
    matches: &[SelectorMatch],
    now: DateTime<Utc>,
) -> TopologyResult<ReconcileOutcome> {
    let live = store.live_relationships(kind, parent_id)?;
    let live_by_child: HashMap<Uuid, String> = live
        .iter()
        .map(|row| (row.child_id, row.selector_id.clone()))
        .collect();

    let mut outcome = ReconcileOutcome::default();
    let mut matched: HashSet<Uuid> = HashSet::new();

    for m in matches {
        // Two selectors matching the same child: first one wins.
        if !matched.insert(m.child_id) {
            continue;
        }
        match live_by_child.get(&m.child_id) {
            Some(selector_id) if *selector_id == m.selector_id => {
                outcome.stable += 1;
            }
            Some(_) => {
                // Stale provenance: persist tombstones the old row and
                // inserts a fresh one with the new selector id.
                match store.persist_relationship(kind, parent_id, m.child_id, &m.selector_id, now)
                {
                    Ok(()) => outcome.reattributed += 1,
                    Err(e) => {
                        warn!(%parent_id, child = %m.child_id, error = %e, "relationship re-attribution failed");
                        outcome.failed += 1;
                    }
                }
            }
            None => {
                match store.persist_relationship(kind, parent_id, m.child_id, &m.selector_id, now)
                {
                    Ok(()) => outcome.inserted += 1,
                    Err(e) => {
                        warn!(%parent_id, child = %m.child_id, error = %e, "relationship insert failed");
                        outcome.failed += 1;
                    }
                }
            }
        }
    }

    for row in &live {
        if !matched.contains(&row.child_id) {
            match store.tombstone_relationship(kind, parent_id, row.child_id, now) {
                Ok(_) => outcome.tombstoned += 1,
                Err(e) => {
                    warn!(%parent_id, child = %row.child_id, error = %e, "relationship tombstone failed");
                    outcome.failed += 1;
                }
            }
        }
    }

    Ok(outcome)
}
