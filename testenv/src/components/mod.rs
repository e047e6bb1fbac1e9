//! In-process mock servers and verifiers
//!
//! Stand-ins for the management plane the proxy talks to: service control,
//! service management, instance metadata, IAM, JWT key servers and the trace
//! collector, plus the stats verifier that reads the proxy admin endpoint.

pub mod iam;
pub mod jwt;
pub mod metadata;
pub mod server;
pub mod service_control;
pub mod service_management;
pub mod stats;
pub mod trace;

pub use iam::MockIam;
pub use jwt::FakeJwtService;
pub use metadata::MockMetadata;
pub use server::MockServer;
pub use service_control::{ControlCall, ControlRequest, MockServiceControl};
pub use service_management::MockServiceManagement;
pub use stats::StatsVerifier;
pub use trace::{FakeTraceServer, TraceBatch};
