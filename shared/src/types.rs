//! Platform types shared by the harness and its binaries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{SharedError, SharedResult};

/// Host used to reach every locally started component.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Placeholder for the dynamic-routing backend port inside backend rule addresses.
pub const WORKING_BACKEND_PORT: &str = "-1";

/// Placeholder for a port nothing listens on; left untouched so requests fail.
pub const INVALID_BACKEND_PORT: &str = "-2";

const BASE_PORT: u16 = 20000;
const PORTS_PER_TEST: u16 = 40;
const JWT_PORT_OFFSET: u16 = 10;

/// Number of ports reserved for fake JWT providers per test.
pub const JWT_PORT_COUNT: u16 = 20;

/// Loopback address as used in gRPC target names.
pub fn loopback_address() -> &'static str {
    LOOPBACK_HOST
}

/// IP protocol prefix for gRPC target names (`ipv4:127.0.0.1:port`).
pub fn ip_protocol() -> &'static str {
    "ipv4"
}

/// Ports allocated to a single test run.
///
/// Every port is derived from the test id, so two tests with different ids
/// never collide and the same id always yields the same layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ports {
    pub test_id: u16,
    pub backend_server_port: u16,
    pub dynamic_routing_backend_port: u16,
    pub listener_port: u16,
    pub admin_port: u16,
    pub discovery_port: u16,
    pub fake_stackdriver_port: u16,
    pub service_control_port: u16,
    pub service_management_port: u16,
    pub metadata_port: u16,
    pub iam_port: u16,
    pub jwt_range_base: u16,
}

impl Ports {
    pub fn new(test_id: u16) -> SharedResult<Self> {
        let base = test_id
            .checked_mul(PORTS_PER_TEST)
            .and_then(|offset| offset.checked_add(BASE_PORT))
            .filter(|base| base.checked_add(PORTS_PER_TEST - 1).is_some())
            .ok_or(SharedError::PortRangeExhausted { test_id })?;

        Ok(Self {
            test_id,
            backend_server_port: base,
            dynamic_routing_backend_port: base + 1,
            listener_port: base + 2,
            admin_port: base + 3,
            discovery_port: base + 4,
            fake_stackdriver_port: base + 5,
            service_control_port: base + 6,
            service_management_port: base + 7,
            metadata_port: base + 8,
            iam_port: base + 9,
            jwt_range_base: base + JWT_PORT_OFFSET,
        })
    }
}

/// Which backend implementation a test exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// HTTP echo server reached through `--backend_address`
    EchoSidecar,
    /// HTTPS echo server reached through dynamic routing
    EchoRemote,
    GrpcBookstoreSidecar,
    GrpcBookstoreRemote,
    GrpcInteropSidecar,
    GrpcEchoSidecar,
    GrpcEchoRemote,
}

impl BackendKind {
    pub const ALL: [BackendKind; 7] = [
        BackendKind::EchoSidecar,
        BackendKind::EchoRemote,
        BackendKind::GrpcBookstoreSidecar,
        BackendKind::GrpcBookstoreRemote,
        BackendKind::GrpcInteropSidecar,
        BackendKind::GrpcEchoSidecar,
        BackendKind::GrpcEchoRemote,
    ];

    /// Remote kinds are reached via dynamic routing rather than a fixed local port.
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            BackendKind::EchoRemote | BackendKind::GrpcBookstoreRemote | BackendKind::GrpcEchoRemote
        )
    }

    /// Port the backend process listens on for this run.
    pub fn listen_port(self, ports: &Ports) -> u16 {
        if self.is_remote() {
            ports.dynamic_routing_backend_port
        } else {
            ports.backend_server_port
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::EchoSidecar => "echo-sidecar",
            BackendKind::EchoRemote => "echo-remote",
            BackendKind::GrpcBookstoreSidecar => "bookstore-sidecar",
            BackendKind::GrpcBookstoreRemote => "bookstore-remote",
            BackendKind::GrpcInteropSidecar => "interop-sidecar",
            BackendKind::GrpcEchoSidecar => "grpc-echo-sidecar",
            BackendKind::GrpcEchoRemote => "grpc-echo-remote",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s.to_lowercase())
            .ok_or_else(|| SharedError::UnsupportedBackend { name: s.to_string() })
    }
}

/// Selects which subsystems emit verbose logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DebugComponents {
    #[default]
    None,
    All,
    Envoy,
    ConfigManager,
    Bootstrap,
}

impl DebugComponents {
    pub fn envoy(self) -> bool {
        matches!(self, DebugComponents::All | DebugComponents::Envoy)
    }

    pub fn config_manager(self) -> bool {
        matches!(self, DebugComponents::All | DebugComponents::ConfigManager)
    }

    pub fn bootstrap(self) -> bool {
        matches!(self, DebugComponents::All | DebugComponents::Bootstrap)
    }
}

impl FromStr for DebugComponents {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Ok(DebugComponents::None),
            "all" => Ok(DebugComponents::All),
            "envoy" => Ok(DebugComponents::Envoy),
            "configmanager" => Ok(DebugComponents::ConfigManager),
            "bootstrap" => Ok(DebugComponents::Bootstrap),
            _ => Err(SharedError::InvalidDebugComponents { value: s.to_string() }),
        }
    }
}
