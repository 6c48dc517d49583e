//! StateStore — redb-backed persistence for Kestrel.
//!
//! Provides typed CRUD over canaries, checks, check statuses, components,
//! config items, relationship rows, and job history. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use kestrel_core::types::{
    Canary, Check, CheckSpec, CheckStatus, Component, ConfigItem, JobHistory, RelationshipRow,
    time_key,
};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CANARIES).map_err(map_err!(Table))?;
        txn.open_table(CHECKS).map_err(map_err!(Table))?;
        txn.open_table(CHECK_STATUSES).map_err(map_err!(Table))?;
        txn.open_table(COMPONENTS).map_err(map_err!(Table))?;
        txn.open_table(CONFIG_ITEMS).map_err(map_err!(Table))?;
        txn.open_table(CHECK_COMPONENTS).map_err(map_err!(Table))?;
        txn.open_table(CONFIG_COMPONENTS).map_err(map_err!(Table))?;
        txn.open_table(COMPONENT_COMPONENTS)
            .map_err(map_err!(Table))?;
        txn.open_table(JOB_HISTORY).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let encoded = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, encoded.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn scan_prefix<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }

    // ── Canaries ───────────────────────────────────────────────────

    /// Insert or update a canary definition.
    pub fn put_canary(&self, canary: &Canary) -> StateResult<()> {
        self.put_json(CANARIES, &canary.id.to_string(), canary)?;
        debug!(id = %canary.id, name = %canary.qualified_name(), "canary stored");
        Ok(())
    }

    /// Get a canary by id.
    pub fn get_canary(&self, id: Uuid) -> StateResult<Option<Canary>> {
        self.get_json(CANARIES, &id.to_string())
    }

    /// List all canaries, including soft-deleted ones.
    pub fn list_canaries(&self) -> StateResult<Vec<Canary>> {
        self.scan_prefix(CANARIES, "")
    }

    /// Soft-delete a canary and all of its checks. Returns true if the
    /// canary existed and was live.
    pub fn soft_delete_canary(&self, id: Uuid, now: DateTime<Utc>) -> StateResult<bool> {
        let mut canary = match self.get_canary(id)? {
            Some(c) if c.deleted_at.is_none() => c,
            _ => return Ok(false),
        };
        canary.deleted_at = Some(now);
        self.put_canary(&canary)?;

        for mut check in self.list_checks(id)? {
            if check.deleted_at.is_none() {
                check.deleted_at = Some(now);
                self.put_json(CHECKS, &check.table_key(), &check)?;
            }
        }
        debug!(%id, "canary soft-deleted");
        Ok(true)
    }

    // ── Checks ─────────────────────────────────────────────────────

    /// Insert-or-refresh a check row for one observed result.
    ///
    /// The (canary id, kind, name) triple identifies the check; an existing
    /// row keeps its id and has its status fields refreshed (a previously
    /// retired transformed check is revived). Returns the check id.
    pub fn upsert_check(
        &self,
        canary_id: Uuid,
        spec: &CheckSpec,
        transformed: bool,
        passing: bool,
        now: DateTime<Utc>,
    ) -> StateResult<Uuid> {
        let existing = self
            .list_checks(canary_id)?
            .into_iter()
            .find(|c| c.kind == spec.kind && c.name == spec.name);

        let check = match existing {
            Some(mut check) => {
                check.passing = passing;
                check.last_runtime = Some(now);
                check.delete_strategy = spec.transform_delete_strategy;
                check.labels = spec.labels.clone();
                check.deleted_at = None;
                check
            }
            None => Check {
                id: Uuid::new_v4(),
                canary_id,
                kind: spec.kind.clone(),
                name: spec.name.clone(),
                description: spec.description.clone(),
                labels: spec.labels.clone(),
                transformed,
                delete_strategy: spec.transform_delete_strategy,
                passing,
                last_runtime: Some(now),
                created_at: now,
                deleted_at: None,
            },
        };
        self.put_json(CHECKS, &check.table_key(), &check)?;
        Ok(check.id)
    }

    /// List all checks for a canary, including soft-deleted ones.
    pub fn list_checks(&self, canary_id: Uuid) -> StateResult<Vec<Check>> {
        self.scan_prefix(CHECKS, &format!("{canary_id}:"))
    }

    /// List live transformed checks for a canary, excluding the given
    /// externally-managed kinds.
    pub fn list_transformed_checks(
        &self,
        canary_id: Uuid,
        exclude_kinds: &[String],
    ) -> StateResult<Vec<Check>> {
        Ok(self
            .list_checks(canary_id)?
            .into_iter()
            .filter(|c| c.transformed && c.deleted_at.is_none())
            .filter(|c| !exclude_kinds.contains(&c.kind))
            .collect())
    }

    /// Look up a check by id alone (full scan).
    pub fn get_check_by_id(&self, check_id: Uuid) -> StateResult<Option<Check>> {
        let suffix = format!(":{check_id}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(CHECKS).map_err(map_err!(Table))?;
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().ends_with(&suffix) {
                let check = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                return Ok(Some(check));
            }
        }
        Ok(None)
    }

    /// Soft-delete the given checks of a canary. Returns number tombstoned.
    pub fn soft_delete_checks(
        &self,
        canary_id: Uuid,
        check_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StateResult<u32> {
        let mut count = 0;
        for mut check in self.list_checks(canary_id)? {
            if check.deleted_at.is_none() && check_ids.contains(&check.id) {
                check.deleted_at = Some(now);
                self.put_json(CHECKS, &check.table_key(), &check)?;
                count += 1;
            }
        }
        Ok(count)
    }

    // ── Check statuses ─────────────────────────────────────────────

    /// Insert one observation. (check id, time) is the natural key:
    /// a duplicate submission is absorbed as a no-op and returns false.
    pub fn insert_status(&self, status: &CheckStatus) -> StateResult<bool> {
        let key = status.table_key();
        let encoded = serde_json::to_vec(status).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut t = txn.open_table(CHECK_STATUSES).map_err(map_err!(Table))?;
            if t.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                inserted = false;
            } else {
                t.insert(key.as_str(), encoded.as_slice())
                    .map_err(map_err!(Write))?;
                inserted = true;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(inserted)
    }

    /// List a check's observations within [start, end], oldest first.
    pub fn list_statuses(
        &self,
        check_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StateResult<Vec<CheckStatus>> {
        let lo = format!("{check_id}:{}", time_key(start));
        let hi = format!("{check_id}:{}", time_key(end));
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(CHECK_STATUSES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t
            .range(lo.as_str()..=hi.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let status = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(status);
        }
        Ok(results)
    }

    /// The most recent observations for a check, newest first.
    pub fn recent_statuses(&self, check_id: Uuid, limit: usize) -> StateResult<Vec<CheckStatus>> {
        let lo = format!("{check_id}:");
        // ';' is ':' + 1, so this bounds the prefix range.
        let hi = format!("{check_id};");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(CHECK_STATUSES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
            .rev()
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let status = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(status);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// The most recent observation for a check, if any.
    pub fn latest_status(&self, check_id: Uuid) -> StateResult<Option<CheckStatus>> {
        let lo = format!("{check_id}:");
        // ';' is ':' + 1, so this bounds the prefix range.
        let hi = format!("{check_id};");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(CHECK_STATUSES).map_err(map_err!(Table))?;
        match t
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
            .next_back()
        {
            Some(entry) => {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let status =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Total number of observations stored for a check.
    pub fn count_statuses(&self, check_id: Uuid) -> StateResult<usize> {
        Ok(self
            .scan_prefix::<CheckStatus>(CHECK_STATUSES, &format!("{check_id}:"))?
            .len())
    }

    /// The raw detail payload for one observation, if present.
    pub fn get_status_detail(
        &self,
        check_id: Uuid,
        time: DateTime<Utc>,
    ) -> StateResult<Option<serde_json::Value>> {
        let key = format!("{check_id}:{}", time_key(time));
        let status: Option<CheckStatus> = self.get_json(CHECK_STATUSES, &key)?;
        Ok(status.and_then(|s| s.detail))
    }

    // ── Components & config items ──────────────────────────────────

    /// Insert or update a component.
    pub fn put_component(&self, component: &Component) -> StateResult<()> {
        self.put_json(COMPONENTS, &component.id.to_string(), component)
    }

    /// Get a component by id.
    pub fn get_component(&self, id: Uuid) -> StateResult<Option<Component>> {
        self.get_json(COMPONENTS, &id.to_string())
    }

    /// List live components.
    pub fn list_components(&self) -> StateResult<Vec<Component>> {
        Ok(self
            .scan_prefix::<Component>(COMPONENTS, "")?
            .into_iter()
            .filter(|c| c.deleted_at.is_none())
            .collect())
    }

    /// Insert or update a config item.
    pub fn put_config_item(&self, item: &ConfigItem) -> StateResult<()> {
        self.put_json(CONFIG_ITEMS, &item.id.to_string(), item)
    }

    /// List live config items.
    pub fn list_config_items(&self) -> StateResult<Vec<ConfigItem>> {
        Ok(self
            .scan_prefix::<ConfigItem>(CONFIG_ITEMS, "")?
            .into_iter()
            .filter(|c| c.deleted_at.is_none())
            .collect())
    }

    // ── Relationships ──────────────────────────────────────────────

    /// Persist a live relationship row for (parent, child).
    ///
    /// Any existing live row for the pair is tombstoned first, so at most
    /// one non-deleted row exists per pair; superseded rows remain in the
    /// arena for history.
    pub fn persist_relationship(
        &self,
        kind: RelationKind,
        parent_id: Uuid,
        child_id: Uuid,
        selector_id: &str,
        now: DateTime<Utc>,
    ) -> StateResult<()> {
        let key = format!("{parent_id}:{child_id}");
        let mut arena: Vec<RelationshipRow> =
            self.get_json(kind.table(), &key)?.unwrap_or_default();
        for row in arena.iter_mut() {
            if row.deleted_at.is_none() {
                row.deleted_at = Some(now);
            }
        }
        arena.push(RelationshipRow {
            parent_id,
            child_id,
            selector_id: selector_id.to_string(),
            created_at: now,
            deleted_at: None,
        });
        self.put_json(kind.table(), &key, &arena)
    }

    /// Tombstone the live relationship row for (parent, child), if any.
    /// Returns true when a live row was tombstoned.
    pub fn tombstone_relationship(
        &self,
        kind: RelationKind,
        parent_id: Uuid,
        child_id: Uuid,
        now: DateTime<Utc>,
    ) -> StateResult<bool> {
        let key = format!("{parent_id}:{child_id}");
        let mut arena: Vec<RelationshipRow> =
            self.get_json(kind.table(), &key)?.unwrap_or_default();
        let mut hit = false;
        for row in arena.iter_mut() {
            if row.deleted_at.is_none() {
                row.deleted_at = Some(now);
                hit = true;
            }
        }
        if hit {
            self.put_json(kind.table(), &key, &arena)?;
        }
        Ok(hit)
    }

    /// All live relationship rows under a parent.
    pub fn live_relationships(
        &self,
        kind: RelationKind,
        parent_id: Uuid,
    ) -> StateResult<Vec<RelationshipRow>> {
        let arenas: Vec<Vec<RelationshipRow>> =
            self.scan_prefix(kind.table(), &format!("{parent_id}:"))?;
        Ok(arenas
            .into_iter()
            .flatten()
            .filter(|r| r.deleted_at.is_none())
            .collect())
    }

    /// The full row history for a (parent, child) pair, oldest first.
    pub fn relationship_history(
        &self,
        kind: RelationKind,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> StateResult<Vec<RelationshipRow>> {
        let key = format!("{parent_id}:{child_id}");
        Ok(self.get_json(kind.table(), &key)?.unwrap_or_default())
    }

    // ── Job history ────────────────────────────────────────────────

    /// Append a job run record.
    pub fn put_job_history(&self, history: &JobHistory) -> StateResult<()> {
        self.put_json(JOB_HISTORY, &history.table_key(), history)
    }

    /// Recent job history for a resource, newest first.
    pub fn list_job_history(
        &self,
        resource_id: &str,
        limit: usize,
    ) -> StateResult<Vec<JobHistory>> {
        let mut entries: Vec<JobHistory> =
            self.scan_prefix(JOB_HISTORY, &format!("{resource_id}:"))?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::types::{CanarySpec, DeleteStrategy};
    use std::collections::HashMap;

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn test_canary(namespace: &str, name: &str) -> Canary {
        Canary {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            labels: HashMap::new(),
            spec: CanarySpec {
                schedule: "@every 30s".to_string(),
                interval: 0,
                owner: "platform".to_string(),
                severity: "critical".to_string(),
                checks: vec![CheckSpec::new("http", "api")],
            },
            agent_id: None,
            created_at: ts("2024-05-01T00:00:00Z"),
            updated_at: ts("2024-05-01T00:00:00Z"),
            deleted_at: None,
        }
    }

    fn test_status(check_id: Uuid, time: &str, pass: bool) -> CheckStatus {
        CheckStatus {
            check_id,
            time: ts(time),
            status: pass,
            invalid: false,
            duration_ms: 42,
            message: String::new(),
            error: String::new(),
            detail: None,
        }
    }

    // ── Canary CRUD ────────────────────────────────────────────────

    #[test]
    fn canary_put_and_get() {
        let store = test_store();
        let canary = test_canary("default", "api");

        store.put_canary(&canary).unwrap();
        let retrieved = store.get_canary(canary.id).unwrap();

        assert_eq!(retrieved, Some(canary));
    }

    #[test]
    fn canary_get_nonexistent_returns_none() {
        let store = test_store();
        assert!(store.get_canary(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn canary_list_all() {
        let store = test_store();
        store.put_canary(&test_canary("ns1", "a")).unwrap();
        store.put_canary(&test_canary("ns1", "b")).unwrap();
        store.put_canary(&test_canary("ns2", "c")).unwrap();

        assert_eq!(store.list_canaries().unwrap().len(), 3);
    }

    #[test]
    fn canary_soft_delete_tombstones_checks() {
        let store = test_store();
        let canary = test_canary("default", "api");
        store.put_canary(&canary).unwrap();
        let check_id = store
            .upsert_check(
                canary.id,
                &CheckSpec::new("http", "api"),
                false,
                true,
                ts("2024-05-01T00:01:00Z"),
            )
            .unwrap();

        assert!(store
            .soft_delete_canary(canary.id, ts("2024-05-01T01:00:00Z"))
            .unwrap());

        let stored = store.get_canary(canary.id).unwrap().unwrap();
        assert!(stored.deleted_at.is_some());
        let checks = store.list_checks(canary.id).unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].id, check_id);
        assert!(checks[0].deleted_at.is_some());

        // Second delete is a no-op.
        assert!(!store
            .soft_delete_canary(canary.id, ts("2024-05-01T02:00:00Z"))
            .unwrap());
    }

    // ── Check upsert ───────────────────────────────────────────────

    #[test]
    fn upsert_check_is_stable_across_runs() {
        let store = test_store();
        let canary_id = Uuid::new_v4();
        let spec = CheckSpec::new("http", "api");

        let first = store
            .upsert_check(canary_id, &spec, false, true, ts("2024-05-01T00:00:00Z"))
            .unwrap();
        let second = store
            .upsert_check(canary_id, &spec, false, false, ts("2024-05-01T00:01:00Z"))
            .unwrap();

        assert_eq!(first, second);
        let checks = store.list_checks(canary_id).unwrap();
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].passing);
        assert_eq!(checks[0].last_runtime, Some(ts("2024-05-01T00:01:00Z")));
    }

    #[test]
    fn upsert_check_revives_retired_check() {
        let store = test_store();
        let canary_id = Uuid::new_v4();
        let spec = CheckSpec::new("http", "pod-a");

        let id = store
            .upsert_check(canary_id, &spec, true, true, ts("2024-05-01T00:00:00Z"))
            .unwrap();
        store
            .soft_delete_checks(canary_id, &[id], ts("2024-05-01T00:01:00Z"))
            .unwrap();
        assert!(store
            .list_transformed_checks(canary_id, &[])
            .unwrap()
            .is_empty());

        let revived = store
            .upsert_check(canary_id, &spec, true, true, ts("2024-05-01T00:02:00Z"))
            .unwrap();
        assert_eq!(id, revived);
        assert_eq!(store.list_transformed_checks(canary_id, &[]).unwrap().len(), 1);
    }

    #[test]
    fn transformed_listing_respects_exclusions() {
        let store = test_store();
        let canary_id = Uuid::new_v4();
        let mut webhook = CheckSpec::new("webhook", "external");
        webhook.transform_delete_strategy = DeleteStrategy::LeaveUnchanged;

        store
            .upsert_check(canary_id, &webhook, true, true, ts("2024-05-01T00:00:00Z"))
            .unwrap();
        store
            .upsert_check(
                canary_id,
                &CheckSpec::new("http", "pod-a"),
                true,
                true,
                ts("2024-05-01T00:00:00Z"),
            )
            .unwrap();

        let all = store.list_transformed_checks(canary_id, &[]).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store
            .list_transformed_checks(canary_id, &["webhook".to_string()])
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].kind, "http");
    }

    #[test]
    fn get_check_by_id_scans() {
        let store = test_store();
        let canary_id = Uuid::new_v4();
        let id = store
            .upsert_check(
                canary_id,
                &CheckSpec::new("dns", "resolver"),
                false,
                true,
                ts("2024-05-01T00:00:00Z"),
            )
            .unwrap();

        let check = store.get_check_by_id(id).unwrap().unwrap();
        assert_eq!(check.canary_id, canary_id);
        assert!(store.get_check_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    // ── Status natural key ─────────────────────────────────────────

    #[test]
    fn duplicate_status_is_noop() {
        let store = test_store();
        let check_id = Uuid::new_v4();
        let status = test_status(check_id, "2024-05-01T00:00:00Z", true);

        assert!(store.insert_status(&status).unwrap());
        assert!(!store.insert_status(&status).unwrap());
        assert_eq!(store.count_statuses(check_id).unwrap(), 1);
    }

    #[test]
    fn statuses_list_in_window() {
        let store = test_store();
        let check_id = Uuid::new_v4();
        for (time, pass) in [
            ("2024-05-01T00:00:00Z", true),
            ("2024-05-01T00:00:30Z", false),
            ("2024-05-01T00:01:00Z", true),
            ("2024-05-01T02:00:00Z", true),
        ] {
            store.insert_status(&test_status(check_id, time, pass)).unwrap();
        }

        let window = store
            .list_statuses(check_id, ts("2024-05-01T00:00:00Z"), ts("2024-05-01T00:05:00Z"))
            .unwrap();
        assert_eq!(window.len(), 3);
        // Oldest first.
        assert!(window[0].time < window[2].time);
    }

    #[test]
    fn statuses_do_not_leak_across_checks() {
        let store = test_store();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.insert_status(&test_status(a, "2024-05-01T00:00:00Z", true)).unwrap();
        store.insert_status(&test_status(b, "2024-05-01T00:00:00Z", false)).unwrap();

        assert_eq!(store.count_statuses(a).unwrap(), 1);
        let latest = store.latest_status(a).unwrap().unwrap();
        assert_eq!(latest.check_id, a);
        assert!(latest.status);
    }

    #[test]
    fn latest_status_returns_newest() {
        let store = test_store();
        let check_id = Uuid::new_v4();
        store.insert_status(&test_status(check_id, "2024-05-01T00:00:00Z", true)).unwrap();
        store.insert_status(&test_status(check_id, "2024-05-01T00:05:00Z", false)).unwrap();

        let latest = store.latest_status(check_id).unwrap().unwrap();
        assert_eq!(latest.time, ts("2024-05-01T00:05:00Z"));
        assert!(!latest.status);
    }

    #[test]
    fn status_detail_round_trip() {
        let store = test_store();
        let check_id = Uuid::new_v4();
        let mut status = test_status(check_id, "2024-05-01T00:00:00Z", true);
        status.detail = Some(serde_json::json!({"code": 200, "body": "ok"}));
        store.insert_status(&status).unwrap();

        let detail = store
            .get_status_detail(check_id, ts("2024-05-01T00:00:00Z"))
            .unwrap();
        assert_eq!(detail, Some(serde_json::json!({"code": 200, "body": "ok"})));
        assert!(store
            .get_status_detail(check_id, ts("2024-05-01T00:00:01Z"))
            .unwrap()
            .is_none());
    }

    // ── Relationships ──────────────────────────────────────────────

    #[test]
    fn relationship_single_live_row_per_pair() {
        let store = test_store();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();

        store
            .persist_relationship(
                RelationKind::ConfigComponent,
                parent,
                child,
                "sel-1",
                ts("2024-05-01T00:00:00Z"),
            )
            .unwrap();
        store
            .persist_relationship(
                RelationKind::ConfigComponent,
                parent,
                child,
                "sel-2",
                ts("2024-05-01T00:01:00Z"),
            )
            .unwrap();

        let live = store
            .live_relationships(RelationKind::ConfigComponent, parent)
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].selector_id, "sel-2");

        // History keeps the superseded row as a tombstone.
        let history = store
            .relationship_history(RelationKind::ConfigComponent, parent, child)
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].deleted_at.is_some());
        assert!(history[1].deleted_at.is_none());
    }

    #[test]
    fn relationship_tombstone() {
        let store = test_store();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();

        store
            .persist_relationship(
                RelationKind::CheckComponent,
                parent,
                child,
                "sel-1",
                ts("2024-05-01T00:00:00Z"),
            )
            .unwrap();
        assert!(store
            .tombstone_relationship(
                RelationKind::CheckComponent,
                parent,
                child,
                ts("2024-05-01T00:01:00Z"),
            )
            .unwrap());
        assert!(store
            .live_relationships(RelationKind::CheckComponent, parent)
            .unwrap()
            .is_empty());
        // No live row left to tombstone.
        assert!(!store
            .tombstone_relationship(
                RelationKind::CheckComponent,
                parent,
                child,
                ts("2024-05-01T00:02:00Z"),
            )
            .unwrap());
    }

    #[test]
    fn relationship_kinds_are_isolated() {
        let store = test_store();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();

        store
            .persist_relationship(
                RelationKind::ComponentComponent,
                parent,
                child,
                "sel-1",
                ts("2024-05-01T00:00:00Z"),
            )
            .unwrap();

        assert_eq!(
            store
                .live_relationships(RelationKind::ComponentComponent, parent)
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .live_relationships(RelationKind::ConfigComponent, parent)
            .unwrap()
            .is_empty());
    }

    // ── Job history ────────────────────────────────────────────────

    #[test]
    fn job_history_newest_first() {
        let store = test_store();
        let resource = Uuid::new_v4().to_string();

        for (i, time) in ["2024-05-01T00:00:00Z", "2024-05-01T00:05:00Z"].iter().enumerate() {
            let mut h = JobHistory::new("canary", "canary", &resource, ts(time));
            h.success_count = i as u32;
            store.put_job_history(&h).unwrap();
        }

        let entries = store.list_job_history(&resource, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].time, ts("2024-05-01T00:05:00Z"));

        let limited = store.list_job_history(&resource, 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let canary = test_canary("prod", "api");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_canary(&canary).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let stored = store.get_canary(canary.id).unwrap();
        assert_eq!(stored.map(|c| c.name), Some("api".to_string()));
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = test_store();
        let id = Uuid::new_v4();

        assert!(store.list_canaries().unwrap().is_empty());
        assert!(store.list_checks(id).unwrap().is_empty());
        assert!(store.list_components().unwrap().is_empty());
        assert!(store.list_config_items().unwrap().is_empty());
        assert!(store.latest_status(id).unwrap().is_none());
        assert_eq!(store.count_statuses(id).unwrap(), 0);
        assert!(store.list_job_history("nope", 5).unwrap().is_empty());
    }
}
