//! Health Registry
//!
//! Components register a weak readiness capability. The registry never keeps a
//! component alive; an entry whose owner is gone is skipped.

use std::sync::{Mutex, PoisonError, Weak};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{EnvError, EnvResult, HealthFailure};
use crate::traits::HealthChecker;

#[derive(Default)]
pub struct HealthRegistry {
    checkers: Mutex<Vec<Weak<dyn HealthChecker>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a checker, preserving insertion order
    pub fn register(&self, checker: Weak<dyn HealthChecker>) {
        self.checkers.lock().unwrap_or_else(PoisonError::into_inner).push(checker);
    }

    pub fn len(&self) -> usize {
        self.checkers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Probe every live checker concurrently and wait for all of them.
    ///
    /// Fails with every failing component named, not just the first.
    pub async fn run_all_health_checks(&self) -> EnvResult<()> {
        let live: Vec<_> = self
            .checkers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        if live.is_empty() {
            debug!("No live health checkers registered");
            return Ok(());
        }

        info!("🩺 Running {} health checks", live.len());

        let results = join_all(live.iter().map(|checker| async move {
            let outcome = checker.check_health().await;
            (checker.component(), outcome)
        }))
        .await;

        let failures: Vec<HealthFailure> = results
            .into_iter()
            .filter_map(|(component, outcome)| {
                outcome.err().map(|err| {
                    warn!("❌ Health check failed for {}: {}", component, err);
                    HealthFailure {
                        component,
                        reason: err.to_string(),
                    }
                })
            })
            .collect();

        if failures.is_empty() {
            info!("✅ All health checks passed");
            Ok(())
        } else {
            Err(EnvError::HealthCheckFailed { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockHealthChecker;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_checker(name: &str, calls: Arc<AtomicUsize>, healthy: bool) -> Arc<dyn HealthChecker> {
        let mut checker = MockHealthChecker::new();
        let component = name.to_string();
        checker.expect_component().returning(move || component.clone());
        checker.expect_check_health().returning(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            if healthy {
                Ok(())
            } else {
                Err(EnvError::StartupFailed {
                    component: "probe".to_string(),
                    message: "connection refused".to_string(),
                })
            }
        });
        Arc::new(checker)
    }

    #[tokio::test]
    async fn test_every_checker_runs_and_failures_are_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let checkers = vec![
            counting_checker("config-manager", calls.clone(), true),
            counting_checker("envoy", calls.clone(), false),
            counting_checker("stats", calls.clone(), true),
        ];

        let registry = HealthRegistry::new();
        for checker in &checkers {
            registry.register(Arc::downgrade(checker));
        }

        let err = registry.run_all_health_checks().await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_matches!(err, EnvError::HealthCheckFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].component, "envoy");
        });
    }

    #[tokio::test]
    async fn test_all_healthy_passes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let checker = counting_checker("envoy", calls.clone(), true);
        let registry = HealthRegistry::new();
        registry.register(Arc::downgrade(&checker));

        registry.run_all_health_checks().await.unwrap();
        registry.run_all_health_checks().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_checkers_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HealthRegistry::new();
        {
            let gone = counting_checker("backend", calls.clone(), false);
            registry.register(Arc::downgrade(&gone));
        }

        registry.run_all_health_checks().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }
}
