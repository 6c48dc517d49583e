//! Domain types for Kestrel.
//!
//! These types represent canary definitions, persisted checks and their
//! observations, components, config items, and the relationship rows that
//! bind them. All types are serializable to/from JSON for storage.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Format a timestamp as a fixed-width, lexicographically sortable key part.
pub fn time_key(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ── Canary ────────────────────────────────────────────────────────

/// A user-defined, independently schedulable group of health checks.
///
/// Mutated by the definition store; read-only to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Canary {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub spec: CanarySpec,
    /// Owning agent, if this canary is managed remotely.
    pub agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Canary {
    /// Namespace-qualified display name.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// The effective schedule expression for this canary.
    ///
    /// Falls back to `@every {interval}s` when no schedule is set, and
    /// to the default schedule when neither is set.
    pub fn effective_schedule(&self) -> String {
        if !self.spec.schedule.is_empty() {
            return self.spec.schedule.clone();
        }
        if self.spec.interval > 0 {
            return format!("@every {}s", self.spec.interval);
        }
        DEFAULT_SCHEDULE.to_string()
    }
}

/// Schedule applied when a canary specifies neither a schedule nor an interval.
pub const DEFAULT_SCHEDULE: &str = "@every 5m";

/// Schedule expression that disables scheduling entirely.
pub const NEVER_SCHEDULE: &str = "@never";

/// Specification body of a canary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CanarySpec {
    /// Standard cron, `@every <duration>`, `@never`, or empty.
    pub schedule: String,
    /// Interval in seconds; used when `schedule` is empty. 0 = unset.
    pub interval: u64,
    pub owner: String,
    pub severity: String,
    /// Ordered set of check definitions.
    pub checks: Vec<CheckSpec>,
}

/// One probe definition within a canary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckSpec {
    /// Probe kind, e.g. "http", "dns", "tcp".
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// What to do with a transformed child of this check when it is retired.
    #[serde(default)]
    pub transform_delete_strategy: DeleteStrategy,
    /// Relationship selectors, for check kinds that support them.
    #[serde(default)]
    pub relationships: Option<RelationshipSpec>,
}

impl CheckSpec {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            description: String::new(),
            labels: HashMap::new(),
            transform_delete_strategy: DeleteStrategy::default(),
            relationships: None,
        }
    }
}

/// Capability trait for check kinds that expose relationship lookups.
///
/// Implemented only by specs that can bind to components/config items;
/// absence of the capability means no relationship extraction is attempted.
pub trait Relatable {
    fn relationships(&self) -> Option<&RelationshipSpec>;
}

impl Relatable for CheckSpec {
    fn relationships(&self) -> Option<&RelationshipSpec> {
        self.relationships.as_ref()
    }
}

/// Terminal status applied to a retired transformed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
    /// Leave the last recorded status as is.
    #[default]
    LeaveUnchanged,
    /// Append a final passing status before retirement.
    MarkHealthy,
    /// Append a final failing status before retirement.
    MarkUnhealthy,
}

// ── Persisted check + observations ────────────────────────────────

/// A persisted check row. Created by a run, soft-deleted by the
/// transformed-check lifecycle or canary deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Check {
    pub id: Uuid,
    pub canary_id: Uuid,
    pub kind: String,
    pub name: String,
    pub description: String,
    pub labels: HashMap<String, String>,
    pub transformed: bool,
    pub delete_strategy: DeleteStrategy,
    /// Latest pass/fail, mirrored from the most recent status.
    pub passing: bool,
    pub last_runtime: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Check {
    /// Composite key for the checks table: `{canary_id}:{check_id}`.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.canary_id, self.id)
    }

    /// Cache key identifying this check across runs:
    /// `{canary_id}/{kind}/{name}`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.canary_id, self.kind, self.name)
    }

    /// Build the initial check row for one probe result. The id is a
    /// candidate; the durable cache link canonicalizes it on write.
    pub fn from_result(canary: &Canary, result: &CheckResult, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            canary_id: canary.id,
            kind: result.check.kind.clone(),
            name: result.check.name.clone(),
            description: result.check.description.clone(),
            labels: result.check.labels.clone(),
            transformed: result.transformed,
            delete_strategy: result.check.transform_delete_strategy,
            passing: result.pass,
            last_runtime: Some(now),
            created_at: now,
            deleted_at: None,
        }
    }
}

// ── Windowed aggregates ───────────────────────────────────────────

/// Pass/fail tally over some window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Uptime {
    pub passed: u64,
    pub failed: u64,
}

impl Uptime {
    /// Fold another tally into this one.
    pub fn add(&mut self, other: Uptime) {
        self.passed += other.passed;
        self.failed += other.failed;
    }

    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    /// Pass percentage; 100.0 when no observations were made.
    pub fn percentage(&self) -> f64 {
        if self.total() == 0 {
            return 100.0;
        }
        100.0 * self.passed as f64 / self.total() as f64
    }
}

impl std::fmt::Display for Uptime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = self.percentage();
        if pct == pct.round() {
            write!(f, "{}/{} ({:.0}%)", self.passed, self.total(), pct)
        } else {
            write!(f, "{}/{} ({:.1}%)", self.passed, self.total(), pct)
        }
    }
}

/// Latency summary over some window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Latency {
    /// 95th percentile latency in milliseconds.
    pub p95_ms: f64,
}

impl std::fmt::Display for Latency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}ms", self.p95_ms)
    }
}

/// One observation of a check. Immutable once written; (check id, time)
/// is the natural key and duplicate writes are no-ops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckStatus {
    pub check_id: Uuid,
    pub time: DateTime<Utc>,
    /// true = pass.
    pub status: bool,
    pub invalid: bool,
    pub duration_ms: u64,
    pub message: String,
    pub error: String,
    pub detail: Option<serde_json::Value>,
}

impl CheckStatus {
    /// Composite key for the statuses table: `{check_id}:{time}`.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.check_id, time_key(self.time))
    }
}

// ── Probe results ─────────────────────────────────────────────────

/// Result of executing one check, as returned by the probe runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub check: CheckSpec,
    /// True when this result was synthesized from another check's output.
    pub transformed: bool,
    pub pass: bool,
    pub invalid: bool,
    pub duration_ms: u64,
    pub message: String,
    pub error: String,
    pub detail: Option<serde_json::Value>,
    /// Custom metrics emitted by the probe.
    pub metrics: Vec<ResultMetric>,
    /// Labels resolved at run time (spec labels + probe additions).
    pub labels: HashMap<String, String>,
}

impl CheckResult {
    /// A passing result with no payload, for the given spec.
    pub fn passing(check: CheckSpec) -> Self {
        Self {
            check,
            transformed: false,
            pass: true,
            invalid: false,
            duration_ms: 0,
            message: String::new(),
            error: String::new(),
            detail: None,
            metrics: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// A failing result with the given error message.
    pub fn failing(check: CheckSpec, error: &str) -> Self {
        Self {
            error: error.to_string(),
            pass: false,
            ..Self::passing(check)
        }
    }
}

/// A custom metric attached to a probe result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMetric {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

// ── Components & config items ─────────────────────────────────────

/// A topology component mirrored from the definition store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Component {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    /// Selectors binding this component to config items.
    pub config_selectors: Vec<Selector>,
    /// Selectors binding this component to child components.
    pub component_selectors: Vec<Selector>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A configuration item mirrored from the definition store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigItem {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ── Selectors ─────────────────────────────────────────────────────

/// A label-matching expression dynamically binding relationships
/// between entities.
///
/// Label keys are kept in a `BTreeMap` so the serialized form is stable
/// and the selector id is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Selector {
    /// Name glob; empty matches any name.
    #[serde(default)]
    pub name: String,
    /// Namespace glob; empty matches any namespace.
    #[serde(default)]
    pub namespace: String,
    /// Required labels; a value of "*" matches any value for that key.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Selector {
    /// Deterministic id for this selector: hex SHA-256 of its JSON form.
    ///
    /// Used to detect provenance changes on relationship rows.
    pub fn selector_id(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        hex::encode(digest)
    }

    /// Whether an entity with the given name/namespace/labels matches.
    pub fn matches(
        &self,
        name: &str,
        namespace: &str,
        labels: &HashMap<String, String>,
    ) -> bool {
        if !self.name.is_empty() && !crate::matchers::match_pattern(name, &self.name) {
            return false;
        }
        if !self.namespace.is_empty()
            && !crate::matchers::match_pattern(namespace, &self.namespace)
        {
            return false;
        }
        for (key, want) in &self.labels {
            match labels.get(key) {
                Some(have) if want == "*" || have == want => {}
                _ => return false,
            }
        }
        true
    }
}

/// Relationship selectors carried by a check spec, binding the check to
/// the components it observes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RelationshipSpec {
    pub components: Vec<Selector>,
}

/// A relationship row between a parent and a child entity.
///
/// Exactly one non-deleted row may exist per (parent, child) pair;
/// superseded rows are tombstoned, never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipRow {
    pub parent_id: Uuid,
    pub child_id: Uuid,
    pub selector_id: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ── Job history ───────────────────────────────────────────────────

/// One run record for a scheduled job, kept per resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobHistory {
    pub name: String,
    pub resource_id: String,
    pub resource_type: String,
    pub success_count: u32,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub time: DateTime<Utc>,
}

impl JobHistory {
    pub fn new(name: &str, resource_type: &str, resource_id: &str, time: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            resource_id: resource_id.to_string(),
            resource_type: resource_type.to_string(),
            success_count: 0,
            errors: Vec::new(),
            duration_ms: 0,
            time,
        }
    }

    /// Composite key for the job history table: `{resource_id}:{time}`.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.resource_id, time_key(self.time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn effective_schedule_prefers_explicit() {
        let mut canary = test_canary();
        canary.spec.schedule = "*/5 * * * *".to_string();
        canary.spec.interval = 30;
        assert_eq!(canary.effective_schedule(), "*/5 * * * *");
    }

    #[test]
    fn effective_schedule_falls_back_to_interval() {
        let mut canary = test_canary();
        canary.spec.schedule = String::new();
        canary.spec.interval = 30;
        assert_eq!(canary.effective_schedule(), "@every 30s");
    }

    #[test]
    fn effective_schedule_defaults() {
        let canary = test_canary();
        assert_eq!(canary.effective_schedule(), DEFAULT_SCHEDULE);
    }

    #[test]
    fn selector_id_is_deterministic() {
        let mut a = Selector::default();
        a.labels.insert("env".to_string(), "prod".to_string());
        a.labels.insert("tier".to_string(), "db".to_string());

        let mut b = Selector::default();
        // Insertion order differs; BTreeMap normalizes it.
        b.labels.insert("tier".to_string(), "db".to_string());
        b.labels.insert("env".to_string(), "prod".to_string());

        assert_eq!(a.selector_id(), b.selector_id());
    }

    #[test]
    fn selector_id_changes_with_expression() {
        let mut a = Selector::default();
        a.labels.insert("env".to_string(), "prod".to_string());
        let mut b = a.clone();
        b.labels.insert("env".to_string(), "dev".to_string());
        assert_ne!(a.selector_id(), b.selector_id());
    }

    #[test]
    fn selector_matches_labels() {
        let mut sel = Selector::default();
        sel.labels.insert("env".to_string(), "prod".to_string());

        assert!(sel.matches("api", "default", &labels(&[("env", "prod")])));
        assert!(!sel.matches("api", "default", &labels(&[("env", "dev")])));
        assert!(!sel.matches("api", "default", &labels(&[])));
    }

    #[test]
    fn selector_wildcard_label_value() {
        let mut sel = Selector::default();
        sel.labels.insert("env".to_string(), "*".to_string());

        assert!(sel.matches("api", "default", &labels(&[("env", "anything")])));
        assert!(!sel.matches("api", "default", &labels(&[("other", "x")])));
    }

    #[test]
    fn selector_matches_name_glob() {
        let sel = Selector {
            name: "api-*".to_string(),
            ..Selector::default()
        };
        assert!(sel.matches("api-gateway", "default", &labels(&[])));
        assert!(!sel.matches("worker", "default", &labels(&[])));
    }

    #[test]
    fn time_key_is_sortable() {
        let earlier = "2024-05-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let later = "2024-05-01T10:00:01Z".parse::<DateTime<Utc>>().unwrap();
        assert!(time_key(earlier) < time_key(later));
        // Fixed width regardless of sub-second precision.
        assert_eq!(time_key(earlier).len(), time_key(later).len());
    }

    #[test]
    fn relatable_capability_gates_extraction() {
        let mut spec = CheckSpec::new("http", "api");
        assert!(spec.relationships().is_none());

        spec.relationships = Some(RelationshipSpec::default());
        assert!(spec.relationships().is_some());
    }

    fn test_canary() -> Canary {
        Canary {
            id: Uuid::new_v4(),
            namespace: "default".to_string(),
            name: "api".to_string(),
            labels: HashMap::new(),
            spec: CanarySpec::default(),
            agent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }
}
