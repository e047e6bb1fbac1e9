//! Trait definitions with mockall annotations for testing
//!
//! These are the seams between the orchestrator and the components it drives.
//! The orchestrator owns process lifetimes through [`ManagedProcess`]; the
//! health registry only ever sees the narrower [`HealthChecker`] capability.

use std::path::PathBuf;
use std::sync::Arc;

use shared::Ports;

use crate::config::BackendSpec;
use crate::error::EnvResult;

/// Readiness probe for a running component
#[mockall::automock]
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    /// Name used when reporting a failed probe
    fn component(&self) -> String;

    /// Probe readiness. May retry internally but must return within a bounded time.
    async fn check_health(&self) -> EnvResult<()>;
}

/// Post-hoc consistency check run at teardown
#[mockall::automock]
#[async_trait::async_trait]
pub trait InvariantVerifier: Send + Sync {
    fn verifier(&self) -> String;

    async fn verify_invariants(&self) -> EnvResult<()>;

    /// Optional readiness probe exposed by the verifier
    fn health_checker(&self) -> Option<Arc<dyn HealthChecker>>;
}

/// A long-running component with a start/stop lifecycle
///
/// Implementations must make `stop_and_wait` safe to call on a component that
/// never started or already stopped.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ManagedProcess: Send + Sync {
    fn name(&self) -> String;

    /// Start the component and wait until it signals readiness or the startup bound elapses.
    async fn start_and_wait(&self) -> EnvResult<()>;

    async fn stop_and_wait(&self) -> EnvResult<()>;

    /// Readiness probe, if the component has one. The process keeps the probe alive.
    fn health_checker(&self) -> Option<Arc<dyn HealthChecker>>;
}

/// Creates the out-of-process components a test environment drives
///
/// The real implementation launches binaries; tests substitute a mock to
/// observe start/stop ordering without spawning anything.
#[mockall::automock]
pub trait ComponentFactory: Send + Sync {
    fn config_manager(
        &self,
        debug: bool,
        ports: &Ports,
        args: Vec<String>,
    ) -> EnvResult<Arc<dyn ManagedProcess>>;

    fn envoy(
        &self,
        envoy_args: Vec<String>,
        bootstrap_args: Vec<String>,
        config_path: PathBuf,
        ports: &Ports,
    ) -> EnvResult<Arc<dyn ManagedProcess>>;

    fn backend(&self, spec: &BackendSpec, port: u16) -> EnvResult<Arc<dyn ManagedProcess>>;

    fn stats_verifier(&self, ports: &Ports) -> EnvResult<Arc<dyn InvariantVerifier>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that mock traits can be instantiated
    #[tokio::test]
    async fn test_mock_trait_instantiation() {
        let mut checker = MockHealthChecker::new();
        checker.expect_check_health().returning(|| Ok(()));
        assert!(checker.check_health().await.is_ok());

        let _process = MockManagedProcess::new();
        let _verifier = MockInvariantVerifier::new();
        let _factory = MockComponentFactory::new();
    }
}
