//! Test environment error types

use shared::SharedError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// One component that failed its readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthFailure {
    pub component: String,
    pub reason: String,
}

impl fmt::Display for HealthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.component, self.reason)
    }
}

fn join_failures<T: fmt::Display>(failures: &[T]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("backend rule address ({address}) is not properly formatted")]
    BackendAddressMalformed { address: String },

    #[error("not supported jwt provider id: {provider_id}")]
    UnsupportedJwtProvider { provider_id: String },

    #[error("backend ({backend}) is not supported: {reason}")]
    UnsupportedBackend { backend: String, reason: String },

    #[error("invalid option {option}: {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("failed to start {component}: {message}")]
    StartupFailed { component: String, message: String },

    #[error("{component} did not become ready within {timeout:?}")]
    StartupTimeout { component: String, timeout: Duration },

    #[error("{component} exited before becoming ready: {status}")]
    ProcessExited { component: String, status: String },

    #[error("health check failed for {}", join_failures(.failures))]
    HealthCheckFailed { failures: Vec<HealthFailure> },

    #[error("{verifier} invariant violated: {message}")]
    InvariantViolated { verifier: String, message: String },

    #[error("error stopping {component}: {message}")]
    StopFailed { component: String, message: String },

    #[error("teardown reported {} failure(s): {}", .failures.len(), join_failures(.failures))]
    TearDownFailed { failures: Vec<String> },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl EnvError {
    /// Configuration errors abort Setup before any process starts.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EnvError::BackendAddressMalformed { .. }
                | EnvError::UnsupportedJwtProvider { .. }
                | EnvError::UnsupportedBackend { .. }
                | EnvError::InvalidOption { .. }
                | EnvError::Shared(_)
        )
    }
}

pub type EnvResult<T> = Result<T, EnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_failure_message_names_every_component() {
        let err = EnvError::HealthCheckFailed {
            failures: vec![
                HealthFailure {
                    component: "envoy".to_string(),
                    reason: "connection refused".to_string(),
                },
                HealthFailure {
                    component: "configmanager".to_string(),
                    reason: "timed out".to_string(),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("envoy: connection refused"));
        assert!(message.contains("configmanager: timed out"));
    }

    #[test]
    fn test_configuration_errors_are_classified() {
        let malformed = EnvError::BackendAddressMalformed {
            address: "https://localhost:8080".to_string(),
        };
        assert!(malformed.is_configuration_error());
        assert_eq!(
            malformed.to_string(),
            "backend rule address (https://localhost:8080) is not properly formatted"
        );

        let timeout = EnvError::StartupTimeout {
            component: "envoy".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(!timeout.is_configuration_error());
    }
}
