//! Test helpers and builder patterns for testenv tests
//!
//! Mock components record every start, stop and verification into a shared
//! event log so tests can assert on ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use shared::{DebugComponents, Ports};
use testenv::traits::{MockComponentFactory, MockHealthChecker, MockInvariantVerifier, MockManagedProcess};
use testenv::{EnvError, HealthChecker, InvariantVerifier, ManagedProcess, TestEnv, TestEnvOptions};

use super::fixtures::TestFixtures;

/// Ordered record of component lifecycle events
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Events with the given prefix, prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| event.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

/// How a mock health checker answers
#[derive(Clone, Copy)]
pub enum Health {
    Healthy,
    Unhealthy,
    /// Healthy for the first `n` probes, unhealthy afterwards
    HealthyFor(usize),
}

pub fn health_checker(name: &str, health: Health) -> Arc<dyn HealthChecker> {
    let mut checker = MockHealthChecker::new();
    let component = name.to_string();
    checker.expect_component().returning(move || component.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    let failing_name = name.to_string();
    checker.expect_check_health().returning(move || {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        let healthy = match health {
            Health::Healthy => true,
            Health::Unhealthy => false,
            Health::HealthyFor(n) => call < n,
        };
        if healthy {
            Ok(())
        } else {
            Err(EnvError::StartupFailed {
                component: failing_name.clone(),
                message: "connection refused".to_string(),
            })
        }
    });
    Arc::new(checker)
}

/// How a mock process behaves over its lifecycle
#[derive(Clone, Copy)]
pub struct ProcessBehavior {
    pub start_ok: bool,
    pub stop_ok: bool,
    pub health: Health,
}

impl ProcessBehavior {
    pub fn healthy() -> Self {
        Self {
            start_ok: true,
            stop_ok: true,
            health: Health::Healthy,
        }
    }
}

pub fn mock_process(name: &str, log: &EventLog, behavior: ProcessBehavior) -> Arc<dyn ManagedProcess> {
    let ProcessBehavior {
        start_ok,
        stop_ok,
        health,
    } = behavior;
    let mut process = MockManagedProcess::new();
    process.expect_name().return_const(name.to_string());

    let start_log = log.clone();
    let start_name = name.to_string();
    process.expect_start_and_wait().returning(move || {
        start_log.push(format!("start:{start_name}"));
        if start_ok {
            Ok(())
        } else {
            Err(EnvError::StartupTimeout {
                component: start_name.clone(),
                timeout: std::time::Duration::from_secs(1),
            })
        }
    });

    let stop_log = log.clone();
    let stop_name = name.to_string();
    process.expect_stop_and_wait().returning(move || {
        stop_log.push(format!("stop:{stop_name}"));
        if stop_ok {
            Ok(())
        } else {
            Err(EnvError::StopFailed {
                component: stop_name.clone(),
                message: "still running after kill".to_string(),
            })
        }
    });

    let checker = health_checker(name, health);
    process.expect_health_checker().returning(move || Some(checker.clone()));
    Arc::new(process)
}

pub fn mock_verifier(log: &EventLog, violation: Option<&str>) -> Arc<dyn InvariantVerifier> {
    let mut verifier = MockInvariantVerifier::new();
    verifier.expect_verifier().return_const("stats-verifier".to_string());

    let verify_log = log.clone();
    let violation = violation.map(str::to_string);
    verifier.expect_verify_invariants().returning(move || {
        verify_log.push("verify:stats".to_string());
        match &violation {
            Some(message) => Err(EnvError::InvariantViolated {
                verifier: "stats-verifier".to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    });
    verifier.expect_health_checker().returning(|| None);
    Arc::new(verifier)
}

/// Builder for a mock component factory with healthy defaults
pub struct FactoryBuilder {
    log: EventLog,
    config_manager_ok: bool,
    envoy_ok: bool,
    backend_ok: bool,
    failing_stops: Vec<String>,
    envoy_health: Health,
    stats_violation: Option<String>,
    conf_args: Arc<Mutex<Vec<String>>>,
    backend_ports: Arc<Mutex<Vec<u16>>>,
    expect_envoy: bool,
    expect_backend: bool,
}

impl FactoryBuilder {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            config_manager_ok: true,
            envoy_ok: true,
            backend_ok: true,
            failing_stops: Vec::new(),
            envoy_health: Health::Healthy,
            stats_violation: None,
            conf_args: Arc::default(),
            backend_ports: Arc::default(),
            expect_envoy: true,
            expect_backend: true,
        }
    }

    pub fn failing_config_manager(mut self) -> Self {
        self.config_manager_ok = false;
        self.expect_envoy = false;
        self.expect_backend = false;
        self
    }

    /// The proxy fails to start, so the backend is never created
    pub fn failing_envoy(mut self) -> Self {
        self.envoy_ok = false;
        self.expect_backend = false;
        self
    }

    /// Stopping the named component reports an error
    pub fn failing_stop(mut self, name: &str) -> Self {
        self.failing_stops.push(name.to_string());
        self
    }

    fn behavior(&self, name: &str, start_ok: bool, health: Health) -> ProcessBehavior {
        ProcessBehavior {
            start_ok,
            stop_ok: !self.failing_stops.iter().any(|failing| failing == name),
            health,
        }
    }

    pub fn failing_backend(mut self) -> Self {
        self.backend_ok = false;
        self
    }

    pub fn envoy_health(mut self, health: Health) -> Self {
        self.envoy_health = health;
        self
    }

    pub fn stats_violation(mut self, message: &str) -> Self {
        self.stats_violation = Some(message.to_string());
        self
    }

    /// The backend must never be created
    pub fn no_backend(mut self) -> Self {
        self.expect_backend = false;
        self
    }

    /// Shared view of the arguments handed to the config manager
    pub fn conf_args(&self) -> Arc<Mutex<Vec<String>>> {
        self.conf_args.clone()
    }

    /// Shared view of the ports backends were created on
    pub fn backend_ports(&self) -> Arc<Mutex<Vec<u16>>> {
        self.backend_ports.clone()
    }

    pub fn build(self) -> MockComponentFactory {
        let mut factory = MockComponentFactory::new();

        let log = self.log.clone();
        let captured = self.conf_args.clone();
        let behavior = self.behavior(TestFixtures::CONFIG_MANAGER, self.config_manager_ok, Health::Healthy);
        factory
            .expect_config_manager()
            .times(0..=1)
            .returning(move |_debug, _ports, args| {
                *captured.lock().unwrap() = args;
                Ok(mock_process(TestFixtures::CONFIG_MANAGER, &log, behavior))
            });

        let log = self.log.clone();
        let behavior = self.behavior(TestFixtures::ENVOY, self.envoy_ok, self.envoy_health);
        let envoy_calls = if self.expect_envoy { 0..=1 } else { 0..=0 };
        factory
            .expect_envoy()
            .times(envoy_calls)
            .returning(move |_, _, _, _| Ok(mock_process(TestFixtures::ENVOY, &log, behavior)));

        let log = self.log.clone();
        let behavior = self.behavior(TestFixtures::BACKEND, self.backend_ok, Health::Healthy);
        let backend_ports = self.backend_ports.clone();
        let backend_calls = if self.expect_backend { 0..=1 } else { 0..=0 };
        factory
            .expect_backend()
            .times(backend_calls)
            .returning(move |_spec, port| {
                backend_ports.lock().unwrap().push(port);
                Ok(mock_process(TestFixtures::BACKEND, &log, behavior))
            });

        let log = self.log.clone();
        let violation = self.stats_violation.clone();
        factory
            .expect_stats_verifier()
            .times(0..=1)
            .returning(move |_ports: &Ports| Ok(mock_verifier(&log, violation.as_deref())));

        factory
    }
}

pub struct TestHelpers;

impl TestHelpers {
    pub fn env(test_id: u16, options: TestEnvOptions, factory: MockComponentFactory) -> TestEnv<MockComponentFactory> {
        shared::logging::init_tracing(DebugComponents::None, false);
        TestEnv::with_factory(test_id, options, factory, DebugComponents::None).unwrap()
    }

    /// Environment with healthy mock components
    pub fn healthy_env(test_id: u16, options: TestEnvOptions) -> (TestEnv<MockComponentFactory>, EventLog) {
        let log = EventLog::default();
        let factory = FactoryBuilder::new(&log).build();
        (Self::env(test_id, options, factory), log)
    }
}
