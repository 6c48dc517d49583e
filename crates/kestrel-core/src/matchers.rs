//! Glob and label matching for inclusion filters.
//!
//! Supports the `*` wildcard forms used by namespace/name filters
//! ("prod-*", "*-canary", "*mid*") and `key=value` label patterns.

use std::collections::HashMap;

/// Match a value against a `*` glob pattern.
pub fn match_pattern(value: &str, pattern: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    if let Some(middle) = pattern
        .strip_prefix('*')
        .and_then(|p| p.strip_suffix('*'))
    {
        return value.contains(middle);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    value == pattern
}

/// Match a value against a list of glob patterns.
///
/// An empty pattern list matches everything.
pub fn match_any(value: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| match_pattern(value, p))
}

/// Match a label map against `key=value` patterns.
///
/// Every pattern must be satisfied; a pattern value of `*` accepts any
/// value for that key. An empty pattern list matches everything.
pub fn match_labels(labels: &HashMap<String, String>, patterns: &[String]) -> bool {
    for pattern in patterns {
        let (key, want) = match pattern.split_once('=') {
            Some(pair) => pair,
            None => (pattern.as_str(), "*"),
        };
        match labels.get(key) {
            Some(have) if want == "*" || match_pattern(have, want) => {}
            _ => return false,
        }
    }
    true
}
