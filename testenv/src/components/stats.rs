//! Proxy statistics verifier
//!
//! Reads the proxy admin counters at teardown and flags values that can only
//! come from an internal failure the test itself would not notice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use shared::{LOOPBACK_HOST, Ports};
use url::Url;

use crate::error::{EnvError, EnvResult};
use crate::runtime::probe::HttpProbe;
use crate::traits::{HealthChecker, InvariantVerifier};

pub const COMPONENT: &str = "stats-verifier";

/// Counters that must stay at zero for a run to count as clean
pub const FORBIDDEN_COUNTERS: &[&str] = &[
    "server.envoy_bug_failures",
    "server.debug_assertion_failures",
    "server.worker_watchdog_miss",
];

const COMPLETED_SUFFIX: &str = ".upstream_rq_completed";
const TOTAL_SUFFIX: &str = ".upstream_rq_total";

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    stats: Vec<StatEntry>,
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    name: String,
    /// Histograms have no plain value
    #[serde(default)]
    value: Option<i64>,
}

/// Check a counter snapshot, returning one message per violation
pub fn check_counters(counters: &HashMap<String, i64>) -> Vec<String> {
    let mut violations: Vec<String> = FORBIDDEN_COUNTERS
        .iter()
        .filter_map(|name| match counters.get(*name) {
            Some(value) if *value != 0 => Some(format!("{name} = {value}")),
            _ => None,
        })
        .collect();

    for (name, completed) in counters {
        let Some(prefix) = name.strip_suffix(COMPLETED_SUFFIX) else {
            continue;
        };
        if let Some(total) = counters.get(&format!("{prefix}{TOTAL_SUFFIX}")) {
            if completed > total {
                violations.push(format!("{prefix}: {completed} requests completed out of {total}"));
            }
        }
    }

    violations.sort();
    violations
}

pub struct StatsVerifier {
    stats_url: Url,
    client: reqwest::Client,
    admin_probe: Arc<dyn HealthChecker>,
}

impl StatsVerifier {
    pub fn new(ports: &Ports) -> EnvResult<Self> {
        let admin = format!("http://{}:{}", LOOPBACK_HOST, ports.admin_port);
        Self::with_admin_url(&admin)
    }

    pub fn with_admin_url(admin: &str) -> EnvResult<Self> {
        let admin = Url::parse(admin)?;
        let mut stats_url = admin.join("/stats")?;
        stats_url.set_query(Some("format=json"));
        let ready_url = admin.join("/ready")?;

        Ok(Self {
            stats_url,
            client: reqwest::Client::new(),
            admin_probe: Arc::new(HttpProbe::new(COMPONENT, ready_url.to_string())),
        })
    }

    async fn fetch_counters(&self) -> EnvResult<HashMap<String, i64>> {
        let response: StatsResponse = self
            .client
            .get(self.stats_url.clone())
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .stats
            .into_iter()
            .filter_map(|entry| entry.value.map(|value| (entry.name, value)))
            .collect())
    }
}

#[async_trait]
impl InvariantVerifier for StatsVerifier {
    fn verifier(&self) -> String {
        COMPONENT.to_string()
    }

    async fn verify_invariants(&self) -> EnvResult<()> {
        let counters = self.fetch_counters().await?;
        let violations = check_counters(&counters);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EnvError::InvariantViolated {
                verifier: COMPONENT.to_string(),
                message: violations.join(", "),
            })
        }
    }

    fn health_checker(&self) -> Option<Arc<dyn HealthChecker>> {
        Some(self.admin_probe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn counters(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_clean_counters_pass() {
        let snapshot = counters(&[
            ("server.envoy_bug_failures", 0),
            ("cluster.backend.upstream_rq_completed", 4),
            ("cluster.backend.upstream_rq_total", 4),
        ]);
        assert!(check_counters(&snapshot).is_empty());
    }

    #[test]
    fn test_violations_are_listed() {
        let snapshot = counters(&[
            ("server.envoy_bug_failures", 2),
            ("cluster.backend.upstream_rq_completed", 5),
            ("cluster.backend.upstream_rq_total", 4),
        ]);
        let violations = check_counters(&snapshot);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.contains("envoy_bug_failures")));
    }

    #[tokio::test]
    async fn test_verifier_reads_admin_stats() {
        let admin = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stats"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stats": [
                    { "name": "server.debug_assertion_failures", "value": 1 },
                    { "name": "cluster.backend.upstream_rq_time", "histograms": {} }
                ]
            })))
            .mount(&admin)
            .await;

        let verifier = StatsVerifier::with_admin_url(&admin.uri()).unwrap();
        let err = verifier.verify_invariants().await.unwrap_err();
        assert!(err.to_string().contains("debug_assertion_failures"));
        assert!(verifier.health_checker().is_some());
    }
}
