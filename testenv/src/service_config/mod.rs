//! Service description document
//!
//! A serde model of the parts of the service configuration the harness reads
//! or rewrites. Everything else is carried as opaque JSON.

pub mod fixtures;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Service document shared between the orchestrator and the mock management plane
pub type SharedServiceConfig = Arc<RwLock<Service>>;

/// Read access that survives a panicked writer
pub fn read_config(config: &SharedServiceConfig) -> RwLockReadGuard<'_, Service> {
    config.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write_config(config: &SharedServiceConfig) -> RwLockWriteGuard<'_, Service> {
    config.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub apis: Vec<Api>,
    #[serde(default)]
    pub http: Http,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Control>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<serde_json::Value>,
    #[serde(default)]
    pub logs: Vec<LogDescriptor>,
    #[serde(default)]
    pub metrics: Vec<MetricDescriptor>,
    #[serde(default)]
    pub monitored_resources: Vec<MonitoredResourceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<Monitoring>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Http {
    #[serde(default)]
    pub rules: Vec<HttpRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRule {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl HttpRule {
    pub fn get(selector: &str, path: &str) -> Self {
        Self {
            selector: selector.to_string(),
            get: Some(path.to_string()),
            ..Default::default()
        }
    }

    pub fn post(selector: &str, path: &str, body: &str) -> Self {
        Self {
            selector: selector.to_string(),
            post: Some(path.to_string()),
            body: Some(body.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    #[serde(default)]
    pub rules: Vec<BackendRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRule {
    pub selector: String,
    /// Empty means "use `--backend_address`"
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub deadline: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl BackendRule {
    pub fn new(selector: &str, address: &str) -> Self {
        Self {
            selector: selector.to_string(),
            address: address.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    #[serde(default)]
    pub rules: Vec<AuthenticationRule>,
    #[serde(default)]
    pub providers: Vec<AuthProvider>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRule {
    pub selector: String,
    #[serde(default)]
    pub requirements: Vec<AuthRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequirement {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub audiences: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProvider {
    pub id: String,
    pub issuer: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub audiences: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub environment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub rules: Vec<UsageRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRule {
    pub selector: String,
    #[serde(default)]
    pub allow_unregistered_calls: bool,
    #[serde(default)]
    pub skip_service_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    #[serde(default)]
    pub allow_cors: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDescriptor {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDescriptor {
    pub name: String,
    pub metric_kind: String,
    pub value_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredResourceDescriptor {
    #[serde(rename = "type")]
    pub resource_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub monitored_resource: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logging {
    #[serde(default)]
    pub producer_destinations: Vec<Destination>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitoring {
    #[serde(default)]
    pub producer_destinations: Vec<Destination>,
    #[serde(default)]
    pub consumer_destinations: Vec<Destination>,
}

const ENDPOINTS_LOG: &str = "endpoints_log";
const API_RESOURCE: &str = "api";

const REQUEST_METRICS: [&str; 4] = [
    "serviceruntime.googleapis.com/api/consumer/request_count",
    "serviceruntime.googleapis.com/api/producer/request_count",
    "serviceruntime.googleapis.com/api/consumer/total_latencies",
    "serviceruntime.googleapis.com/api/producer/total_latencies",
];

impl Service {
    /// Point service control at the mock's URL
    pub fn set_fake_control_environment(&mut self, url: &str) {
        self.control = Some(Control {
            environment: url.to_string(),
        });
    }

    /// Declare the endpoint log and request metrics the proxy reports to service control
    pub fn append_log_metrics(&mut self) {
        if !self.logs.iter().any(|log| log.name == ENDPOINTS_LOG) {
            self.logs.push(LogDescriptor {
                name: ENDPOINTS_LOG.to_string(),
            });
        }
        if !self
            .monitored_resources
            .iter()
            .any(|resource| resource.resource_type == API_RESOURCE)
        {
            self.monitored_resources.push(MonitoredResourceDescriptor {
                resource_type: API_RESOURCE.to_string(),
            });
        }

        for metric in REQUEST_METRICS {
            if self.metrics.iter().any(|existing| existing.name == metric) {
                continue;
            }
            let value_type = if metric.ends_with("latencies") { "DISTRIBUTION" } else { "INT64" };
            self.metrics.push(MetricDescriptor {
                name: metric.to_string(),
                metric_kind: "DELTA".to_string(),
                value_type: value_type.to_string(),
            });
        }

        self.logging = Some(Logging {
            producer_destinations: vec![Destination {
                monitored_resource: API_RESOURCE.to_string(),
                logs: vec![ENDPOINTS_LOG.to_string()],
                metrics: vec![],
            }],
        });

        let metrics_for = |side: &str| Destination {
            monitored_resource: API_RESOURCE.to_string(),
            logs: vec![],
            metrics: REQUEST_METRICS
                .iter()
                .filter(|name| name.contains(side))
                .map(|name| name.to_string())
                .collect(),
        };
        self.monitoring = Some(Monitoring {
            producer_destinations: vec![metrics_for("/producer/")],
            consumer_destinations: vec![metrics_for("/consumer/")],
        });
    }

    /// Authentication section, created empty when absent
    pub fn authentication_mut(&mut self) -> &mut Authentication {
        self.authentication.get_or_insert_with(Authentication::default)
    }

    pub fn backend_rules(&self) -> &[BackendRule] {
        self.backend.as_ref().map(|backend| backend.rules.as_slice()).unwrap_or(&[])
    }
}
