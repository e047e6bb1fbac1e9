//! Test Environment
//!
//! Brings up the management-plane mocks, the config manager, the proxy and the
//! backend for one test, gates on readiness, and tears everything down again
//! while checking invariants that would otherwise go unnoticed.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use shared::{BackendKind, DebugComponents, Ports, component_debug, component_info, component_warn};
use tokio::time::sleep;

use super::factory::RealComponents;
use super::health::HealthRegistry;
use super::slot::ProcessSlot;
use crate::components::service_management::INIT_ROLLOUT_ID;
use crate::components::{
    FakeJwtService, FakeTraceServer, MockIam, MockMetadata, MockServiceControl, MockServiceManagement,
};
use crate::config::{BackendSpec, HarnessSettings, TestEnvOptions};
use crate::derive::{
    DerivationInput, add_dynamic_routing_backend_port, attach_jwt_providers, bootstrap_config_path, derive_args,
    proxy_args, required_jwt_providers,
};
use crate::error::{EnvError, EnvResult};
use crate::service_config::fixtures::service_config_for;
use crate::service_config::{
    Authentication, BackendRule, Endpoint, HttpRule, SharedServiceConfig, UsageRule, read_config, write_config,
};
use crate::testing::report::{TearDownFailure, TearDownReport};
use crate::traits::{ComponentFactory, HealthChecker, InvariantVerifier, ManagedProcess};

const COMPONENT: &str = "testenv";

pub struct TestEnv<F: ComponentFactory = RealComponents> {
    factory: F,
    options: TestEnvOptions,
    ports: Ports,
    debug: DebugComponents,
    service_config: SharedServiceConfig,
    health: HealthRegistry,
    setup_started: bool,
    skip_health_checks: bool,
    rollout_id: String,

    config_manager: ProcessSlot,
    envoy: ProcessSlot,
    backend: ProcessSlot,

    jwt: FakeJwtService,
    service_control: Option<MockServiceControl>,
    service_management: Option<MockServiceManagement>,
    metadata: Option<MockMetadata>,
    iam: Option<MockIam>,
    stats_verifier: Option<Arc<dyn InvariantVerifier>>,
    stats_probe: Option<Arc<dyn HealthChecker>>,
    trace_server: Option<FakeTraceServer>,
}

impl TestEnv<RealComponents> {
    /// Environment backed by the binaries named in the harness settings
    pub fn new(test_id: u16, options: TestEnvOptions) -> EnvResult<Self> {
        let settings = HarnessSettings::from_env()?;
        let debug = settings.debug_components;
        Self::with_factory(test_id, options, RealComponents::new(settings), debug)
    }
}

impl<F: ComponentFactory> TestEnv<F> {
    pub fn with_factory(test_id: u16, options: TestEnvOptions, factory: F, debug: DebugComponents) -> EnvResult<Self> {
        let ports = Ports::new(test_id)?;
        let service = service_config_for(options.backend_kind());
        let skip_health_checks = options.skip_health_checks;

        Ok(Self {
            factory,
            options,
            ports,
            debug,
            service_config: Arc::new(RwLock::new(service)),
            health: HealthRegistry::new(),
            setup_started: false,
            skip_health_checks,
            rollout_id: INIT_ROLLOUT_ID.to_string(),
            config_manager: ProcessSlot::NotStarted,
            envoy: ProcessSlot::NotStarted,
            backend: ProcessSlot::NotStarted,
            jwt: FakeJwtService::new(),
            service_control: None,
            service_management: None,
            metadata: None,
            iam: None,
            stats_verifier: None,
            stats_probe: None,
            trace_server: None,
        })
    }

    pub fn ports(&self) -> Ports {
        self.ports
    }

    pub fn options(&self) -> &TestEnvOptions {
        &self.options
    }

    pub fn service_config(&self) -> SharedServiceConfig {
        self.service_config.clone()
    }

    pub fn health_registry(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn service_control(&self) -> Option<&MockServiceControl> {
        self.service_control.as_ref()
    }

    pub fn service_management(&self) -> Option<&MockServiceManagement> {
        self.service_management.as_ref()
    }

    pub fn metadata(&self) -> Option<&MockMetadata> {
        self.metadata.as_ref()
    }

    pub fn iam(&self) -> Option<&MockIam> {
        self.iam.as_ref()
    }

    pub fn trace_server(&self) -> Option<&FakeTraceServer> {
        self.trace_server.as_ref()
    }

    pub fn jwt(&self) -> &FakeJwtService {
        &self.jwt
    }

    pub fn backend_running(&self) -> bool {
        self.backend.is_running()
    }

    // Service description edits, applied before setup

    pub fn override_authentication(&mut self, authentication: Authentication) {
        write_config(&self.service_config).authentication = Some(authentication);
    }

    /// Change the rollout the mock management plane reports, and the config id it serves
    pub fn override_rollout_id_and_config_id(&mut self, rollout_id: &str, config_id: &str) {
        write_config(&self.service_config).id = config_id.to_string();
        self.rollout_id = rollout_id.to_string();

        if let Some(management) = &self.service_management {
            management.set_rollout_id(rollout_id);
        }
        if let Some(control) = &self.service_control {
            control.set_rollout_id(rollout_id);
        }
    }

    pub fn service_config_id(&self) -> String {
        read_config(&self.service_config).id.clone()
    }

    pub fn override_system_parameters(&mut self, system_parameters: Value) {
        write_config(&self.service_config).system_parameters = Some(system_parameters);
    }

    pub fn override_quota(&mut self, quota: Value) {
        write_config(&self.service_config).quota = Some(quota);
    }

    pub fn append_http_rules(&mut self, rules: Vec<HttpRule>) {
        write_config(&self.service_config).http.rules.extend(rules);
    }

    pub fn append_backend_rules(&mut self, rules: Vec<BackendRule>) {
        let mut config = write_config(&self.service_config);
        config.backend.get_or_insert_with(Default::default).rules.extend(rules);
    }

    pub fn remove_all_backend_rules(&mut self) {
        if let Some(backend) = write_config(&self.service_config).backend.as_mut() {
            backend.rules.clear();
        }
    }

    pub fn append_usage_rules(&mut self, rules: Vec<UsageRule>) {
        write_config(&self.service_config).usage.rules.extend(rules);
    }

    /// Allow CORS on the service's API endpoint
    pub fn set_allow_cors(&mut self) {
        let mut config = write_config(&self.service_config);
        if config.endpoints.is_empty() {
            let name = config.name.clone();
            config.endpoints.push(Endpoint { name, allow_cors: true });
        } else {
            config.endpoints[0].allow_cors = true;
        }
    }

    /// Run a different backend kind with the same overrides; the service description is kept
    pub fn override_backend_service(&mut self, kind: BackendKind) -> EnvResult<()> {
        self.options.backend = BackendSpec::resolve(kind, &self.options.backend_overrides)?;
        Ok(())
    }

    /// Skip readiness checks. After setup this still skips the teardown checks.
    pub fn skip_health_checks(&mut self) {
        self.skip_health_checks = true;
    }

    /// Start everything for the test, in dependency order.
    ///
    /// On error, whatever already started stays in place for `tear_down`.
    pub async fn setup(&mut self, extra_conf_args: Vec<String>) -> EnvResult<()> {
        if self.setup_started {
            return Err(EnvError::InvalidOption {
                option: "setup".to_string(),
                reason: "setup already ran for this environment".to_string(),
            });
        }
        self.setup_started = true;
        let ports = self.ports;
        component_info!(COMPONENT, "🚀 Setting up test {} with backend {}", ports.test_id, self.options.backend_kind());

        let provider_ids = {
            let mut config = write_config(&self.service_config);
            add_dynamic_routing_backend_port(&mut config, ports.dynamic_routing_backend_port)?;
            required_jwt_providers(&config)
        };

        component_info!(COMPONENT, "Requested JWT providers for this test: {:?}", provider_ids);
        self.jwt.setup_jwt(&provider_ids, &ports).await?;
        {
            let jwt = &self.jwt;
            let mut config = write_config(&self.service_config);
            attach_jwt_providers(&mut config, &provider_ids, |id| jwt.provider(id))?;
        }

        let control = MockServiceControl::start(ports.service_control_port, &self.rollout_id).await?;
        let service_control_url = control.url();
        self.service_control = Some(control);
        {
            let mut config = write_config(&self.service_config);
            config.set_fake_control_environment(&service_control_url);
            config.append_log_metrics();
        }

        if self.options.service_management {
            let management =
                MockServiceManagement::start(ports.service_management_port, self.service_config.clone()).await?;
            management.set_rollout_id(&self.rollout_id);
            self.service_management = Some(management);
        }

        if self.options.mock_metadata {
            self.metadata = Some(
                MockMetadata::start(
                    ports.metadata_port,
                    self.options.mock_metadata_override.clone(),
                    self.options.mock_metadata_failures,
                )
                .await?,
            );
        }

        if let Some(script) = &self.options.iam {
            self.iam = Some(MockIam::start(ports.iam_port, script).await?);
        }

        let service_name = read_config(&self.service_config).name.clone();
        let service_management_url = self.service_management.as_ref().map(MockServiceManagement::url);
        let metadata_url = self.metadata.as_ref().map(MockMetadata::url);
        let iam_url = self.iam.as_ref().map(MockIam::url);

        let derived = derive_args(&DerivationInput {
            extra_args: extra_conf_args,
            options: &self.options,
            ports: &ports,
            service_name: &service_name,
            debug: self.debug,
            service_control_url: &service_control_url,
            service_management_url: service_management_url.as_deref(),
            metadata_url: metadata_url.as_deref(),
            iam_url: iam_url.as_deref(),
        });
        component_debug!(COMPONENT, "Config manager args: {:?}", derived.conf_args);

        let config_manager = self
            .factory
            .config_manager(self.debug.config_manager(), &ports, derived.conf_args)?;
        self.config_manager.start(config_manager.clone()).await?;
        register_process(&self.health, &config_manager);

        let envoy = self.factory.envoy(
            proxy_args(self.debug, self.options.envoy_drain_time_secs),
            derived.bootstrap_args,
            bootstrap_config_path(&ports),
            &ports,
        )?;
        if !self.options.skip_envoy_health_checks {
            register_process(&self.health, &envoy);
        }
        self.envoy.start(envoy).await?;

        let stats = self.factory.stats_verifier(&ports)?;
        if let Some(probe) = stats.health_checker() {
            self.health.register(Arc::downgrade(&probe));
            self.stats_probe = Some(probe);
        }
        self.stats_verifier = Some(stats);
        self.trace_server =
            Some(FakeTraceServer::start(ports.fake_stackdriver_port, self.options.tracing_enabled()).await?);

        if !self.options.backend_not_start {
            let port = self.options.backend_kind().listen_port(&ports);
            let backend = self.factory.backend(&self.options.backend, port)?;
            self.backend.start(backend).await?;
        }

        sleep(self.options.settle_time).await;

        if !self.skip_health_checks {
            self.health.run_all_health_checks().await?;
        }

        component_info!(COMPONENT, "✅ Test {} environment ready", ports.test_id);
        Ok(())
    }

    /// Stop only the backend. Teardown will not stop it again.
    pub async fn stop_backend_server(&mut self) -> EnvResult<()> {
        self.backend.stop().await
    }

    /// Check invariants and stop everything, collecting every failure.
    pub async fn tear_down(&mut self) -> TearDownReport {
        component_info!(COMPONENT, "🧹 Start tearing down test {}", self.ports.test_id);
        let mut report = TearDownReport::new();

        if !self.skip_health_checks {
            if let Err(e) = self.health.run_all_health_checks().await {
                report.record(TearDownFailure::HealthCheck(e.to_string()));
            }
        }

        if let Some(stats) = &self.stats_verifier {
            if let Err(e) = stats.verify_invariants().await {
                report.record_invariant(&stats.verifier(), e);
            }
        }

        if let Some(trace) = &self.trace_server {
            if let Err(e) = trace.verify_invariants().await {
                report.record_invariant(&trace.verifier(), e);
            }
        }

        self.jwt.tear_down().await;

        let slots = [
            ("config-manager", &mut self.config_manager),
            ("envoy", &mut self.envoy),
            ("backend", &mut self.backend),
        ];
        for (component, slot) in slots {
            if let Err(e) = slot.stop().await {
                component_warn!(COMPONENT, "Failed to stop {}: {}", component, e);
                report.record_stop(component, e);
            }
        }

        if let Some(metadata) = &self.metadata {
            metadata.stop().await;
        }
        if let Some(iam) = &self.iam {
            iam.stop().await;
        }
        if let Some(management) = &self.service_management {
            management.stop().await;
        }
        if let Some(control) = &self.service_control {
            control.stop().await;
        }
        if let Some(trace) = &self.trace_server {
            trace.stop().await;
        }

        if report.is_clean() {
            component_info!(COMPONENT, "✅ Teardown of test {} complete", self.ports.test_id);
        } else {
            component_warn!(
                COMPONENT,
                "Teardown of test {} finished with {} failure(s)",
                self.ports.test_id,
                report.failures().len()
            );
        }
        report
    }
}

fn register_process(health: &HealthRegistry, process: &Arc<dyn ManagedProcess>) {
    if let Some(checker) = process.health_checker() {
        health.register(Arc::downgrade(&checker));
    }
}
