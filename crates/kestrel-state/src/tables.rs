//! redb table definitions for the Kestrel state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{parent_id}:{child_id}` or
//! `{id}:{time}`.

use redb::TableDefinition;

/// Canary definitions keyed by `{canary_id}`.
pub const CANARIES: TableDefinition<&str, &[u8]> = TableDefinition::new("canaries");

/// Persisted checks keyed by `{canary_id}:{check_id}`.
pub const CHECKS: TableDefinition<&str, &[u8]> = TableDefinition::new("checks");

/// Check observations keyed by `{check_id}:{time}` (fixed-width RFC 3339).
pub const CHECK_STATUSES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("check_statuses");

/// Components keyed by `{component_id}`.
pub const COMPONENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("components");

/// Config items keyed by `{config_id}`.
pub const CONFIG_ITEMS: TableDefinition<&str, &[u8]> = TableDefinition::new("config_items");

/// Check→component relationship arenas keyed by `{check_id}:{component_id}`.
pub const CHECK_COMPONENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("check_component_relationships");

/// Component→config relationship arenas keyed by `{component_id}:{config_id}`.
pub const CONFIG_COMPONENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("config_component_relationships");

/// Component→component relationship arenas keyed by `{parent_id}:{child_id}`.
pub const COMPONENT_COMPONENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("component_component_relationships");

/// Job run history keyed by `{resource_id}:{time}`.
pub const JOB_HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("job_history");

/// The three selector-derived relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Parent: check, child: component.
    CheckComponent,
    /// Parent: component, child: config item.
    ConfigComponent,
    /// Parent: component, child: component.
    ComponentComponent,
}

impl RelationKind {
    pub(crate) fn table(&self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            RelationKind::CheckComponent => CHECK_COMPONENTS,
            RelationKind::ConfigComponent => CONFIG_COMPONENTS,
            RelationKind::ComponentComponent => COMPONENT_COMPONENTS,
        }
    }
}
