//! Transformed-check lifecycle — retirement of synthesized checks.
//!
//! A run may fan out auxiliary checks from a parent result. After the
//! run, any transformed check that existed before but was not recreated
//! is retired: grouped by its delete-strategy, given one terminal status,
//! and soft-deleted. A run that created no transformed checks retires
//! nothing, so a transient zero-result run never wipes history.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use kestrel_core::types::{Check, CheckStatus, DeleteStrategy};
use kestrel_state::StateStore;

use crate::error::SchedulerResult;

/// Retire transformed checks that vanished this run.
///
/// `existed_before` is the snapshot taken before the run (externally
/// managed kinds already excluded); `created_now` holds the transformed
/// check ids (re)created by this run. Returns the retired ids.
pub fn retire_transformed(
    store: &StateStore,
    canary_id: Uuid,
    existed_before: &[Check],
    created_now: &[Uuid],
    now: DateTime<Utc>,
) -> SchedulerResult<Vec<Uuid>> {
    if created_now.is_empty() {
        // A zero-result run retires nothing.
        return Ok(Vec::new());
    }

    let retirees: Vec<&Check> = existed_before
        .iter()
        .filter(|check| !created_now.contains(&check.id))
        .collect();
    if retirees.is_empty() {
        return Ok(Vec::new());
    }

    // One terminal status per strategy group; leave-unchanged gets none.
    for (strategy, passing) in [
        (DeleteStrategy::MarkHealthy, true),
        (DeleteStrategy::MarkUnhealthy, false),
    ] {
        for check in retirees.iter().filter(|c| c.delete_strategy == strategy) {
            let terminal = CheckStatus {
                check_id: check.id,
                time: now,
                status: passing,
                invalid: false,
                duration_ms: 0,
                message: "transformed check retired".to_string(),
                error: String::new(),
                detail: None,
            };
            if let Err(e) = store.insert_status(&terminal) {
                warn!(check = %check.id, error = %e, "failed to record terminal status");
            }
        }
    }

    let ids: Vec<Uuid> = retirees.iter().map(|c| c.id).collect();
    store.soft_delete_checks(canary_id, &ids, now)?;
    debug!(canary = %canary_id, retired = ids.len(), "transformed checks retired");
    Ok(ids)
}
