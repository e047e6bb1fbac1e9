//! Teardown report
//!
//! TearDown never stops at the first problem. It records every failure here and
//! hands the report back so the test decides how to fail.

use std::fmt;

use shared::component_error;

use crate::error::{EnvError, EnvResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TearDownFailure {
    /// A component was unhealthy when teardown started
    HealthCheck(String),
    Invariant { verifier: String, message: String },
    Stop { component: String, message: String },
}

impl fmt::Display for TearDownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TearDownFailure::HealthCheck(message) => write!(f, "health check failure during teardown: {message}"),
            TearDownFailure::Invariant { verifier, message } => write!(f, "{verifier} invariant violated: {message}"),
            TearDownFailure::Stop { component, message } => write!(f, "error stopping {component}: {message}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TearDownReport {
    failures: Vec<TearDownFailure>,
}

impl TearDownReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, failure: TearDownFailure) {
        component_error!("teardown", "❌ {}", failure);
        self.failures.push(failure);
    }

    /// Record a verifier error, keeping the verifier's own message when it has one
    pub fn record_invariant(&mut self, verifier: &str, err: EnvError) {
        let message = match err {
            EnvError::InvariantViolated { message, .. } => message,
            other => other.to_string(),
        };
        self.record(TearDownFailure::Invariant {
            verifier: verifier.to_string(),
            message,
        });
    }

    pub fn record_stop(&mut self, component: &str, err: EnvError) {
        let message = match err {
            EnvError::StopFailed { message, .. } => message,
            other => other.to_string(),
        };
        self.record(TearDownFailure::Stop {
            component: component.to_string(),
            message,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[TearDownFailure] {
        &self.failures
    }

    pub fn into_result(self) -> EnvResult<()> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(EnvError::TearDownFailed {
                failures: self.failures.iter().map(ToString::to_string).collect(),
            })
        }
    }
}
