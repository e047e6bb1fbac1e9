//! Real component factory
//!
//! Builds child processes from the binaries in the harness bin directory.

use std::path::PathBuf;
use std::sync::Arc;

use shared::{LOOPBACK_HOST, Ports};

use super::envoy::{EnvoyProcess, bootstrapper_command_args, envoy_command_args};
use super::probe::TcpProbe;
use super::process::ChildProcess;
use crate::components::StatsVerifier;
use crate::config::{BackendSpec, EchoServerFlags, HarnessSettings};
use crate::error::EnvResult;
use crate::traits::{ComponentFactory, HealthChecker, InvariantVerifier, ManagedProcess};

pub const CONFIG_MANAGER_BINARY: &str = "configmanager";
pub const BOOTSTRAP_BINARY: &str = "bootstrap";
pub const ENVOY_BINARY: &str = "envoy";
pub const ECHO_BINARY: &str = "echo";
pub const BOOKSTORE_BINARY: &str = "bookstore";
pub const INTEROP_BINARY: &str = "interop-server";
pub const GRPC_ECHO_BINARY: &str = "grpc-echo";

/// Binary name and arguments for a backend listening on `port`
pub fn backend_command(spec: &BackendSpec, port: u16) -> (&'static str, Vec<String>) {
    let port_flag = format!("--port={port}");
    match spec {
        BackendSpec::EchoSidecar(flags) | BackendSpec::EchoRemote(flags) => (ECHO_BINARY, echo_args(port_flag, flags)),
        BackendSpec::GrpcBookstoreSidecar => (
            BOOKSTORE_BINARY,
            vec![port_flag, "--enable_tls=false".to_string()],
        ),
        BackendSpec::GrpcBookstoreRemote {
            use_wrong_cert,
            mtls_cert_file,
        } => {
            let mut args = vec![
                port_flag,
                "--enable_tls=true".to_string(),
                format!("--use_wrong_cert={use_wrong_cert}"),
            ];
            if let Some(file) = mtls_cert_file {
                args.push(format!("--mtls_cert_file={file}"));
            }
            (BOOKSTORE_BINARY, args)
        }
        BackendSpec::GrpcInteropSidecar => (INTEROP_BINARY, vec![port_flag]),
        BackendSpec::GrpcEchoSidecar | BackendSpec::GrpcEchoRemote => (GRPC_ECHO_BINARY, vec![port_flag]),
    }
}

fn echo_args(port_flag: String, flags: &EchoServerFlags) -> Vec<String> {
    let mut args = vec![
        port_flag,
        format!("--enable_https={}", flags.enable_https),
        format!("--use_wrong_cert={}", flags.use_wrong_cert),
        format!("--enable_root_path_handler={}", flags.enable_root_path_handler),
        format!("--disable_http2={}", flags.disable_http2),
        format!("--always_respond_rst={}", flags.always_respond_rst),
    ];
    if let Some(file) = &flags.mtls_cert_file {
        args.push(format!("--mtls_cert_file={file}"));
    }
    if flags.reject_request_num != 0 {
        args.push(format!("--reject_request_num={}", flags.reject_request_num));
    }
    if flags.reject_request_status != 0 {
        args.push(format!("--reject_request_status={}", flags.reject_request_status));
    }
    args
}

fn loopback(port: u16) -> String {
    format!("{LOOPBACK_HOST}:{port}")
}

pub struct RealComponents {
    settings: HarnessSettings,
}

impl RealComponents {
    pub fn new(settings: HarnessSettings) -> Self {
        Self { settings }
    }

    fn child(&self, name: &str, binary: &str, args: Vec<String>, inherit_output: bool) -> ChildProcess {
        ChildProcess::new(name, self.settings.binary(binary), args)
            .inherit_output(inherit_output)
            .timeouts(self.settings.startup_timeout, self.settings.stop_timeout)
    }
}

impl ComponentFactory for RealComponents {
    fn config_manager(&self, debug: bool, ports: &Ports, args: Vec<String>) -> EnvResult<Arc<dyn ManagedProcess>> {
        let mut command_args = vec![format!("--discovery_port={}", ports.discovery_port)];
        if debug {
            command_args.push("--logtostderr".to_string());
            command_args.push("--v=1".to_string());
        }
        command_args.extend(args);

        let probe: Arc<dyn HealthChecker> = Arc::new(TcpProbe::new("config-manager", loopback(ports.discovery_port)));
        let process = self
            .child("config-manager", CONFIG_MANAGER_BINARY, command_args, debug)
            .readiness(probe);
        Ok(Arc::new(process))
    }

    fn envoy(
        &self,
        envoy_args: Vec<String>,
        bootstrap_args: Vec<String>,
        config_path: PathBuf,
        ports: &Ports,
    ) -> EnvResult<Arc<dyn ManagedProcess>> {
        let debug = self.settings.debug_components;

        let admin_probe: Arc<dyn HealthChecker> = Arc::new(TcpProbe::new("envoy-admin", loopback(ports.admin_port)));
        let listener_probe: Arc<dyn HealthChecker> = Arc::new(TcpProbe::new("envoy", loopback(ports.listener_port)));

        let envoy = self
            .child(
                "envoy",
                ENVOY_BINARY,
                envoy_command_args(&envoy_args, ports, &config_path),
                debug.envoy(),
            )
            .readiness(admin_probe);

        let process = EnvoyProcess::new(
            self.settings.binary(BOOTSTRAP_BINARY),
            bootstrapper_command_args(&bootstrap_args, ports, &config_path),
            config_path,
            envoy,
            listener_probe,
        )
        .inherit_bootstrap_output(debug.bootstrap());
        Ok(Arc::new(process))
    }

    fn backend(&self, spec: &BackendSpec, port: u16) -> EnvResult<Arc<dyn ManagedProcess>> {
        let (binary, args) = backend_command(spec, port);
        let name = spec.kind().to_string();
        let probe: Arc<dyn HealthChecker> = Arc::new(TcpProbe::new(name.clone(), loopback(port)));
        let process = self.child(&name, binary, args, false).readiness(probe);
        Ok(Arc::new(process))
    }

    fn stats_verifier(&self, ports: &Ports) -> EnvResult<Arc<dyn InvariantVerifier>> {
        Ok(Arc::new(StatsVerifier::new(ports)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendOverrides;
    use shared::BackendKind;

    #[test]
    fn test_remote_echo_runs_https_with_root_handler() {
        let spec = BackendSpec::resolve(BackendKind::EchoRemote, &BackendOverrides::default()).unwrap();
        let (binary, args) = backend_command(&spec, 20041);

        assert_eq!(binary, ECHO_BINARY);
        assert_eq!(args[0], "--port=20041");
        assert!(args.contains(&"--enable_https=true".to_string()));
        assert!(args.contains(&"--enable_root_path_handler=true".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("--reject_request_num")));
    }

    #[test]
    fn test_echo_reject_flags_are_independent() {
        let overrides = BackendOverrides {
            reject_request_num: 2,
            ..Default::default()
        };
        let spec = BackendSpec::resolve(BackendKind::EchoSidecar, &overrides).unwrap();
        let (_, args) = backend_command(&spec, 7);

        assert!(args.contains(&"--reject_request_num=2".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("--reject_request_status")));
    }

    #[test]
    fn test_remote_bookstore_carries_tls_overrides() {
        let overrides = BackendOverrides {
            use_wrong_backend_cert: true,
            mtls_cert_file: Some("/certs/client.crt".to_string()),
            ..Default::default()
        };
        let spec = BackendSpec::resolve(BackendKind::GrpcBookstoreRemote, &overrides).unwrap();
        let (binary, args) = backend_command(&spec, 1);

        assert_eq!(binary, BOOKSTORE_BINARY);
        assert_eq!(
            args,
            vec![
                "--port=1",
                "--enable_tls=true",
                "--use_wrong_cert=true",
                "--mtls_cert_file=/certs/client.crt"
            ]
        );
    }

    #[test]
    fn test_every_kind_has_a_binary() {
        for kind in BackendKind::ALL {
            let spec = BackendSpec::resolve(kind, &BackendOverrides::default()).unwrap();
            let (binary, args) = backend_command(&spec, 5);
            assert!(!binary.is_empty());
            assert_eq!(args[0], "--port=5");
        }
    }

    #[test]
    fn test_factory_exposes_probes() {
        let factory = RealComponents::new(HarnessSettings::default());
        let ports = Ports::new(4).unwrap();

        let config_manager = factory.config_manager(false, &ports, vec![]).unwrap();
        assert_eq!(config_manager.name(), "config-manager");
        assert!(config_manager.health_checker().is_some());

        let envoy = factory
            .envoy(vec![], vec![], PathBuf::from("/tmp/unused.json"), &ports)
            .unwrap();
        assert_eq!(envoy.health_checker().map(|probe| probe.component()), Some("envoy".to_string()));
    }
}
