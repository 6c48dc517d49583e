//! The bundled dry-run probe runner.
//!
//! Marks every check in the canary's spec as passing without executing
//! anything, the same way webhook-style checks are persisted as
//! successful without being run. Real deployments supply their own
//! `ProbeRunner` implementation for HTTP/DNS/TCP/... probes.

use kestrel_core::types::{Canary, CheckResult};
use kestrel_core::{BoxFuture, ProbeRunner};

/// Emits one passing result per configured check.
pub struct DryRunProbes;

impl ProbeRunner for DryRunProbes {
    fn run(&self, canary: Canary) -> BoxFuture<Vec<CheckResult>> {
        let results = canary
            .spec
            .checks
            .iter()
            .map(|check| {
                let mut result = CheckResult::passing(check.clone());
                result.message = "dry-run".to_string();
                result
            })
            .collect();
        Box::pin(async move { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;
    use kestrel_core::types::{CanarySpec, CheckSpec};
    use uuid::Uuid;

    #[tokio::test]
    async fn one_passing_result_per_check() {
        let canary = Canary {
            id: Uuid::new_v4(),
            namespace: "default".to_string(),
            name: "api".to_string(),
            labels: HashMap::new(),
            spec: CanarySpec {
                checks: vec![CheckSpec::new("http", "a"), CheckSpec::new("dns", "b")],
                ..CanarySpec::default()
            },
            agent_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        let results = DryRunProbes.run(canary).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.pass));
    }
}
