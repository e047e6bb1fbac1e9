//! Test Environment Options
//!
//! Sparse per-test overrides. Every option defaults to "not set", and an unset
//! option contributes no flag, so downstream processes keep their own defaults.

use std::collections::HashMap;
use std::time::Duration;

use shared::BackendKind;

use super::backend::{BackendOverrides, BackendSpec};
use crate::error::{EnvError, EnvResult};

/// Default pause after startup for readiness that no probe covers
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(1);

/// Script for the mock IAM server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IamScript {
    /// Response body keyed by request path
    pub resps: HashMap<String, String>,
    /// Number of leading requests answered with 500
    pub failures: u32,
    /// Delay before every response
    pub resp_time: Duration,
}

/// Service account plus delegate chain used for IAM impersonation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Impersonation {
    pub service_account: Option<String>,
    pub delegates: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestEnvOptions {
    pub backend: BackendSpec,
    /// Kept so the backend kind can be swapped later with the same overrides
    pub backend_overrides: BackendOverrides,
    /// Do not start any backend process
    pub backend_not_start: bool,
    /// Explicit `--backend_address`; computed from the backend kind when unset
    pub backend_address: Option<String>,
    pub envoy_drain_time_secs: Option<u32>,
    pub mock_metadata: bool,
    pub mock_metadata_override: HashMap<String, String>,
    pub mock_metadata_failures: u32,
    pub service_management: bool,
    pub iam: Option<IamScript>,
    pub backend_auth_iam: Impersonation,
    pub service_control_iam: Impersonation,
    /// Service control network failures let requests through
    pub sc_network_fail_open: bool,
    pub skip_health_checks: bool,
    pub skip_envoy_health_checks: bool,
    /// Tracing is enabled iff a sample rate is set
    pub tracing_sample_rate: Option<f32>,
    pub settle_time: Duration,
}

impl TestEnvOptions {
    /// Create a new builder for the given backend kind
    pub fn builder(kind: BackendKind) -> TestEnvOptionsBuilder {
        TestEnvOptionsBuilder::new(kind)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing_sample_rate.is_some()
    }
}

pub struct TestEnvOptionsBuilder {
    kind: BackendKind,
    overrides: BackendOverrides,
    backend_not_start: bool,
    backend_address: Option<String>,
    envoy_drain_time_secs: Option<u32>,
    mock_metadata: bool,
    mock_metadata_override: HashMap<String, String>,
    mock_metadata_failures: u32,
    service_management: bool,
    iam: Option<IamScript>,
    backend_auth_iam: Impersonation,
    service_control_iam: Impersonation,
    sc_network_fail_open: bool,
    skip_health_checks: bool,
    skip_envoy_health_checks: bool,
    tracing_sample_rate: Option<f32>,
    settle_time: Duration,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

impl TestEnvOptionsBuilder {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            overrides: BackendOverrides::default(),
            backend_not_start: false,
            backend_address: None,
            envoy_drain_time_secs: None,
            mock_metadata: true,
            mock_metadata_override: HashMap::new(),
            mock_metadata_failures: 0,
            service_management: true,
            iam: None,
            backend_auth_iam: Impersonation::default(),
            service_control_iam: Impersonation::default(),
            sc_network_fail_open: false,
            skip_health_checks: false,
            skip_envoy_health_checks: false,
            tracing_sample_rate: None,
            settle_time: DEFAULT_SETTLE_TIME,
        }
    }

    /// Proxy drain time; also adds `--drain-time-s` outside debug mode. Zero means unset.
    pub fn envoy_drain_time_secs(mut self, secs: u32) -> Self {
        self.envoy_drain_time_secs = (secs != 0).then_some(secs);
        self
    }

    /// Override mock metadata responses by path and fail the first `failures` requests
    pub fn mock_metadata_override(mut self, responses: HashMap<String, String>, failures: u32) -> Self {
        self.mock_metadata_override = responses;
        self.mock_metadata_failures = failures;
        self
    }

    /// Skip the mock metadata server and its `--metadata_url` flags
    pub fn disable_mock_metadata(mut self) -> Self {
        self.mock_metadata = false;
        self
    }

    /// Skip the mock service management server and `--service_management_url`
    pub fn disable_service_management(mut self) -> Self {
        self.service_management = false;
        self
    }

    /// Explicit backend address; an empty string keeps the computed default
    pub fn backend_address<S: Into<String>>(mut self, address: S) -> Self {
        self.backend_address = non_empty(address.into());
        self
    }

    /// Start the mock IAM server with this response script
    pub fn iam_resps(mut self, resps: HashMap<String, String>, failures: u32, resp_time: Duration) -> Self {
        self.iam = Some(IamScript {
            resps,
            failures,
            resp_time,
        });
        self
    }

    pub fn backend_auth_iam_service_account<S: Into<String>>(mut self, account: S) -> Self {
        self.backend_auth_iam.service_account = non_empty(account.into());
        self
    }

    pub fn backend_auth_iam_delegates<S: Into<String>>(mut self, delegates: S) -> Self {
        self.backend_auth_iam.delegates = non_empty(delegates.into());
        self
    }

    pub fn service_control_iam_service_account<S: Into<String>>(mut self, account: S) -> Self {
        self.service_control_iam.service_account = non_empty(account.into());
        self
    }

    pub fn service_control_iam_delegates<S: Into<String>>(mut self, delegates: S) -> Self {
        self.service_control_iam.delegates = non_empty(delegates.into());
        self
    }

    /// Let requests through when service control is unreachable (default: fail closed)
    pub fn enable_sc_network_fail_open(mut self) -> Self {
        self.sc_network_fail_open = true;
        self
    }

    pub fn enable_echo_server_root_path_handler(mut self) -> Self {
        self.overrides.enable_root_path_handler = true;
        self
    }

    /// Skip readiness checks after Setup and before TearDown
    pub fn skip_health_checks(mut self) -> Self {
        self.skip_health_checks = true;
        self
    }

    /// Skip the proxy listener probe; other probes still run
    pub fn skip_envoy_health_checks(mut self) -> Self {
        self.skip_envoy_health_checks = true;
        self
    }

    /// Enable tracing with the given sample rate in `[0, 1]`
    pub fn tracing_sample_rate(mut self, rate: f32) -> Self {
        self.tracing_sample_rate = Some(rate);
        self
    }

    pub fn use_wrong_backend_cert(mut self, wrong: bool) -> Self {
        self.overrides.use_wrong_backend_cert = wrong;
        self
    }

    pub fn disable_http2_for_https_backend(mut self) -> Self {
        self.overrides.disable_http2_for_https_backend = true;
        self
    }

    pub fn backend_always_respond_rst(mut self, rst: bool) -> Self {
        self.overrides.always_respond_rst = rst;
        self
    }

    pub fn backend_not_start(mut self, not_start: bool) -> Self {
        self.backend_not_start = not_start;
        self
    }

    pub fn backend_reject_request_num(mut self, num: u32) -> Self {
        self.overrides.reject_request_num = num;
        self
    }

    pub fn backend_reject_request_status(mut self, status: u16) -> Self {
        self.overrides.reject_request_status = status;
        self
    }

    /// Enable mutual TLS on the backend with this certificate file
    pub fn backend_mtls_cert_file<S: Into<String>>(mut self, file: S) -> Self {
        self.overrides.mtls_cert_file = non_empty(file.into());
        self
    }

    pub fn settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// Validate and build the options
    pub fn build(self) -> EnvResult<TestEnvOptions> {
        if let Some(rate) = self.tracing_sample_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(EnvError::InvalidOption {
                    option: "tracing_sample_rate".to_string(),
                    reason: format!("{rate} is outside [0, 1]"),
                });
            }
        }

        let backend = BackendSpec::resolve(self.kind, &self.overrides)?;

        Ok(TestEnvOptions {
            backend,
            backend_overrides: self.overrides,
            backend_not_start: self.backend_not_start,
            backend_address: self.backend_address,
            envoy_drain_time_secs: self.envoy_drain_time_secs,
            mock_metadata: self.mock_metadata,
            mock_metadata_override: self.mock_metadata_override,
            mock_metadata_failures: self.mock_metadata_failures,
            service_management: self.service_management,
            iam: self.iam,
            backend_auth_iam: self.backend_auth_iam,
            service_control_iam: self.service_control_iam,
            sc_network_fail_open: self.sc_network_fail_open,
            skip_health_checks: self.skip_health_checks,
            skip_envoy_health_checks: self.skip_envoy_health_checks,
            tracing_sample_rate: self.tracing_sample_rate,
            settle_time: self.settle_time,
        })
    }
}
