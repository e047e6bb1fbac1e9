//! Test fixtures and data for testenv tests
//!
//! Every test that calls `setup` binds real loopback ports derived from its
//! test id, so each one gets its own id from this table.

use std::time::Duration;

use shared::BackendKind;
use testenv::{TestEnvOptions, TestEnvOptionsBuilder};

pub struct TestFixtures;

impl TestFixtures {
    pub const START_ORDER_ID: u16 = 101;
    pub const CONFIG_MANAGER_FAILURE_ID: u16 = 102;
    pub const STOP_BACKEND_ID: u16 = 103;
    pub const MALFORMED_ADDRESS_ID: u16 = 104;
    pub const TRACING_ENABLED_ID: u16 = 105;
    pub const TRACING_DISABLED_ID: u16 = 106;
    pub const UNKNOWN_JWT_ID: u16 = 107;
    pub const TEARDOWN_HEALTH_ID: u16 = 108;
    pub const STATS_VIOLATION_ID: u16 = 109;
    pub const BACKEND_NOT_START_ID: u16 = 110;
    pub const REMOTE_BACKEND_ID: u16 = 111;
    pub const MANAGEMENT_DOCUMENT_ID: u16 = 112;
    pub const SETUP_TWICE_ID: u16 = 113;
    pub const SKIP_ENVOY_HEALTH_ID: u16 = 114;
    pub const BACKEND_FAILURE_ID: u16 = 115;
    pub const SKIP_HEALTH_AFTER_SETUP_ID: u16 = 116;
    pub const OPTIONAL_MOCKS_ID: u16 = 117;
    pub const ENVOY_FAILURE_ID: u16 = 118;
    pub const STOP_FAILURE_ID: u16 = 119;

    pub const CONFIG_MANAGER: &'static str = "config-manager";
    pub const ENVOY: &'static str = "envoy";
    pub const BACKEND: &'static str = "backend";

    /// Builder with no settle pause so tests stay fast
    pub fn options_builder(kind: BackendKind) -> TestEnvOptionsBuilder {
        TestEnvOptions::builder(kind).settle_time(Duration::ZERO)
    }

    pub fn options(kind: BackendKind) -> TestEnvOptions {
        Self::options_builder(kind).build().unwrap()
    }
}
