//! Integration test environment
//!
//! Orchestrates the processes an end-to-end proxy test needs: mock
//! management-plane servers, the config manager, the proxy and a backend.
//!
//! ## Main Interface
//!
//! [`TestEnv`] owns one test's processes. Configure it with
//! [`TestEnvOptions`], call [`TestEnv::setup`], run the test body against the
//! proxy listener, then call [`TestEnv::tear_down`] and inspect the report.
//!
//! ## Quick Start
//!
//! ```no_run
//! use shared::BackendKind;
//! use testenv::{TestEnv, TestEnvOptions};
//!
//! # async fn run() -> testenv::EnvResult<()> {
//! let options = TestEnvOptions::builder(BackendKind::EchoSidecar)
//!     .tracing_sample_rate(1.0)
//!     .build()?;
//!
//! let mut env = TestEnv::new(12, options)?;
//! env.setup(vec!["--rollout_strategy=fixed".to_string()]).await?;
//!
//! // ... send requests to 127.0.0.1:<env.ports().listener_port> ...
//!
//! env.tear_down().await.into_result()
//! # }
//! ```

// Core modules
pub mod components;
pub mod config;
pub mod derive;
pub mod error;
pub mod runtime;
pub mod service_config;
pub mod testing;
pub mod traits;

// Main interfaces - re-exported at crate root for convenience
pub use config::{BackendOverrides, BackendSpec, HarnessSettings, TestEnvOptions, TestEnvOptionsBuilder};
pub use error::{EnvError, EnvResult, HealthFailure};
pub use runtime::{HealthRegistry, ProcessSlot, RealComponents, TestEnv};
pub use testing::{TearDownFailure, TearDownReport};
pub use traits::{ComponentFactory, HealthChecker, InvariantVerifier, ManagedProcess};
