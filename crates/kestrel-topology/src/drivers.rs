//! The three reconciliation drivers.
//!
//! Check→component relationships are extracted during a canary run, for
//! check kinds exposing the `Relatable` capability. Component→config and
//! component→component relationships are re-derived on a periodic tick,
//! one reconcile pass per parent component; a failing parent is logged
//! and the tick moves on.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use kestrel_core::types::{Component, Relatable};
use kestrel_state::{RelationKind, StateStore};

use crate::error::TopologyResult;
use crate::reconcile::{reconcile, ReconcileOutcome, SelectorMatch};

/// Extract and reconcile check→component relationships for one check.
///
/// Check kinds without the `Relatable` capability are a no-op. Selectors
/// are evaluated against the live component set on every call.
pub fn sync_check_relationships(
    store: &StateStore,
    check_id: Uuid,
    spec: &dyn Relatable,
    now: DateTime<Utc>,
) -> TopologyResult<ReconcileOutcome> {
    let relationships = match spec.relationships() {
        Some(spec) => spec,
        None => return Ok(ReconcileOutcome::default()),
    };

    let components = store.list_components()?;
    let mut matches = Vec::new();
    for selector in &relationships.components {
        let selector_id = selector.selector_id();
        for component in &components {
            if selector.matches(&component.name, &component.namespace, &component.labels) {
                matches.push(SelectorMatch {
                    child_id: component.id,
                    selector_id: selector_id.clone(),
                });
            }
        }
    }

    reconcile(store, RelationKind::CheckComponent, check_id, &matches, now)
}

/// Reconcile one component's config and child-component relationships.
pub fn sync_component_relationships(
    store: &StateStore,
    component: &Component,
    now: DateTime<Utc>,
) -> TopologyResult<(ReconcileOutcome, ReconcileOutcome)> {
    let configs = store.list_config_items()?;
    let mut config_matches = Vec::new();
    for selector in &component.config_selectors {
        let selector_id = selector.selector_id();
        for config in &configs {
            if selector.matches(&config.name, &config.namespace, &config.labels) {
                config_matches.push(SelectorMatch {
                    child_id: config.id,
                    selector_id: selector_id.clone(),
                });
            }
        }
    }
    let config_outcome = reconcile(
        store,
        RelationKind::ConfigComponent,
        component.id,
        &config_matches,
        now,
    )?;

    let components = store.list_components()?;
    let mut child_matches = Vec::new();
    for selector in &component.component_selectors {
        let selector_id = selector.selector_id();
        for child in &components {
            // A component never parents itself.
            if child.id == component.id {
                continue;
            }
            if selector.matches(&child.name, &child.namespace, &child.labels) {
                child_matches.push(SelectorMatch {
                    child_id: child.id,
                    selector_id: selector_id.clone(),
                });
            }
        }
    }
    let child_outcome = reconcile(
        store,
        RelationKind::ComponentComponent,
        component.id,
        &child_matches,
        now,
    )?;

    Ok((config_outcome, child_outcome))
}

/// One reconciliation tick over all live components.
///
/// Returns the number of components reconciled; a per-component failure
/// is logged and does not abort the tick.
pub fn sync_components(store: &StateStore, now: DateTime<Utc>) -> TopologyResult<u32> {
    let components = store.list_components()?;
    let mut synced = 0;
    for component in &components {
        match sync_component_relationships(store, component, now) {
            Ok((configs, children)) => {
                debug!(
                    component = %component.id,
                    config_rows = configs.inserted + configs.reattributed,
                    child_rows = children.inserted + children.reattributed,
                    "component relationships reconciled"
                );
                synced += 1;
            }
            Err(e) => {
                warn!(component = %component.id, error = %e, "component reconciliation failed");
            }
        }
    }
    Ok(synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use kestrel_core::types::{CheckSpec, ConfigItem, RelationshipSpec, Selector};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn label_selector(key: &str, value: &str) -> Selector {
        let mut selector = Selector::default();
        selector
            .labels
            .insert(key.to_string(), value.to_string());
        selector
    }

    fn component(name: &str, with_labels: &[(&str, &str)]) -> Component {
        Component {
            id: Uuid::new_v4(),
            namespace: "default".to_string(),
            name: name.to_string(),
            labels: labels(with_labels),
            config_selectors: Vec::new(),
            component_selectors: Vec::new(),
            deleted_at: None,
        }
    }

    #[test]
    fn non_relatable_check_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        let spec = CheckSpec::new("http", "api");

        let outcome =
            sync_check_relationships(&store, Uuid::new_v4(), &spec, ts("2024-05-01T00:00:00Z"))
                .unwrap();
        assert_eq!(outcome, ReconcileOutcome::default());
    }

    #[test]
    fn relatable_check_binds_matching_components() {
        let store = StateStore::open_in_memory().unwrap();
        let matching = component("db", &[("tier", "db")]);
        let other = component("web", &[("tier", "web")]);
        store.put_component(&matching).unwrap();
        store.put_component(&other).unwrap();

        let mut spec = CheckSpec::new("http", "db-check");
        spec.relationships = Some(RelationshipSpec {
            components: vec![label_selector("tier", "db")],
        });

        let check_id = Uuid::new_v4();
        let outcome =
            sync_check_relationships(&store, check_id, &spec, ts("2024-05-01T00:00:00Z")).unwrap();
        assert_eq!(outcome.inserted, 1);

        let live = store
            .live_relationships(RelationKind::CheckComponent, check_id)
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].child_id, matching.id);
    }

    #[test]
    fn component_tick_binds_configs_and_children() {
        let store = StateStore::open_in_memory().unwrap();

        let config = ConfigItem {
            id: Uuid::new_v4(),
            namespace: "default".to_string(),
            name: "db-credentials".to_string(),
            labels: labels(&[("app", "db")]),
            deleted_at: None,
        };
        store.put_config_item(&config).unwrap();

        let child = component("db-replica", &[("role", "replica")]);
        store.put_component(&child).unwrap();

        let mut parent = component("db", &[]);
        parent.config_selectors = vec![label_selector("app", "db")];
        parent.component_selectors = vec![label_selector("role", "replica")];
        store.put_component(&parent).unwrap();

        let synced = sync_components(&store, ts("2024-05-01T00:00:00Z")).unwrap();
        assert_eq!(synced, 2);

        let configs = store
            .live_relationships(RelationKind::ConfigComponent, parent.id)
            .unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].child_id, config.id);

        let children = store
            .live_relationships(RelationKind::ComponentComponent, parent.id)
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].child_id, child.id);
    }

    #[test]
    fn component_never_parents_itself() {
        let store = StateStore::open_in_memory().unwrap();
        let mut parent = component("db", &[("role", "db")]);
        parent.component_selectors = vec![label_selector("role", "db")];
        store.put_component(&parent).unwrap();

        sync_components(&store, ts("2024-05-01T00:00:00Z")).unwrap();

        assert!(store
            .live_relationships(RelationKind::ComponentComponent, parent.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn selector_drift_retargets_on_next_tick() {
        let store = StateStore::open_in_memory().unwrap();
        let old_target = component("db-1", &[("shard", "1")]);
        let new_target = component("db-2", &[("shard", "2")]);
        store.put_component(&old_target).unwrap();
        store.put_component(&new_target).unwrap();

        let mut spec = CheckSpec::new("http", "shard-check");
        spec.relationships = Some(RelationshipSpec {
            components: vec![label_selector("shard", "1")],
        });
        let check_id = Uuid::new_v4();
        sync_check_relationships(&store, check_id, &spec, ts("2024-05-01T00:00:00Z")).unwrap();

        // The selector now points at shard 2.
        spec.relationships = Some(RelationshipSpec {
            components: vec![label_selector("shard", "2")],
        });
        let outcome =
            sync_check_relationships(&store, check_id, &spec, ts("2024-05-01T00:01:00Z")).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.tombstoned, 1);

        let live = store
            .live_relationships(RelationKind::CheckComponent, check_id)
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].child_id, new_target.id);
    }
}
