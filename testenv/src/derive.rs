//! Configuration derivation
//!
//! Pure functions turning sparse test options into a rewritten service
//! description and the argument lists of the config manager, the bootstrap
//! helper and the proxy. Nothing here starts a process.

use std::collections::BTreeSet;
use std::path::PathBuf;

use shared::{
    BackendKind, DebugComponents, INVALID_BACKEND_PORT, LOOPBACK_HOST, Ports, WORKING_BACKEND_PORT, ip_protocol,
    loopback_address,
};

use crate::config::TestEnvOptions;
use crate::error::{EnvError, EnvResult};
use crate::service_config::{AuthProvider, Service};

/// Replace the working-port placeholder in every backend rule address.
///
/// Empty addresses are left alone; the proxy falls back to `--backend_address`.
pub fn add_dynamic_routing_backend_port(service: &mut Service, port: u16) -> EnvResult<()> {
    let Some(backend) = service.backend.as_mut() else {
        return Ok(());
    };

    for rule in backend.rules.iter_mut() {
        if rule.address.is_empty() {
            continue;
        }

        if !rule.address.contains(WORKING_BACKEND_PORT) && !rule.address.contains(INVALID_BACKEND_PORT) {
            return Err(EnvError::BackendAddressMalformed {
                address: rule.address.clone(),
            });
        }

        rule.address = rule.address.replace(WORKING_BACKEND_PORT, &port.to_string());
    }
    Ok(())
}

/// Unique JWT provider ids referenced by any authentication requirement
pub fn required_jwt_providers(service: &Service) -> BTreeSet<String> {
    service
        .authentication
        .iter()
        .flat_map(|auth| auth.rules.iter())
        .flat_map(|rule| rule.requirements.iter())
        .filter(|requirement| !requirement.provider_id.is_empty())
        .map(|requirement| requirement.provider_id.clone())
        .collect()
}

/// Append a provider descriptor for every requested id.
///
/// Ids already described in the document are not appended again. An id the
/// lookup cannot provide is a configuration error.
pub fn attach_jwt_providers<F>(service: &mut Service, provider_ids: &BTreeSet<String>, lookup: F) -> EnvResult<()>
where
    F: Fn(&str) -> Option<AuthProvider>,
{
    let resolved = provider_ids
        .iter()
        .map(|id| {
            lookup(id).ok_or_else(|| EnvError::UnsupportedJwtProvider {
                provider_id: id.clone(),
            })
        })
        .collect::<EnvResult<Vec<_>>>()?;

    let auth = service.authentication_mut();
    for provider in resolved {
        if !auth.providers.iter().any(|existing| existing.id == provider.id) {
            auth.providers.push(provider);
        }
    }
    Ok(())
}

/// Address passed as `--backend_address`; empty for dynamic-routing backends.
pub fn backend_address(ports: &Ports, kind: BackendKind) -> String {
    let host_port = format!("{}:{}", LOOPBACK_HOST, ports.backend_server_port);
    match kind {
        BackendKind::EchoRemote | BackendKind::GrpcBookstoreRemote | BackendKind::GrpcEchoRemote => String::new(),
        BackendKind::GrpcBookstoreSidecar | BackendKind::GrpcEchoSidecar | BackendKind::GrpcInteropSidecar => {
            format!("grpc://{host_port}")
        }
        BackendKind::EchoSidecar => format!("http://{host_port}"),
    }
}

/// Trace collector address in gRPC target form, `ipv4:127.0.0.1:<port>`
pub fn tracing_address(ports: &Ports) -> String {
    format!("{}:{}:{}", ip_protocol(), loopback_address(), ports.fake_stackdriver_port)
}

/// Bootstrap file the proxy reads, unique per test id
pub fn bootstrap_config_path(ports: &Ports) -> PathBuf {
    std::env::temp_dir().join(format!("testenv-bootstrap-{}.json", ports.test_id))
}

/// Everything the argument derivation depends on
#[derive(Debug, Clone)]
pub struct DerivationInput<'a> {
    /// Arguments the test passes through unchanged, emitted first
    pub extra_args: Vec<String>,
    pub options: &'a TestEnvOptions,
    pub ports: &'a Ports,
    pub service_name: &'a str,
    pub debug: DebugComponents,
    pub service_control_url: &'a str,
    pub service_management_url: Option<&'a str>,
    pub metadata_url: Option<&'a str>,
    pub iam_url: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedArgs {
    pub conf_args: Vec<String>,
    pub bootstrap_args: Vec<String>,
}

/// Build the config manager and bootstrap argument lists.
pub fn derive_args(input: &DerivationInput<'_>) -> DerivedArgs {
    let options = input.options;
    let mut conf_args = input.extra_args.clone();
    let mut bootstrap_args = Vec::new();

    conf_args.push(format!("--service_control_url={}", input.service_control_url));

    if let Some(url) = input.service_management_url {
        conf_args.push(format!("--service_management_url={url}"));
    }

    if !options.sc_network_fail_open {
        conf_args.push("--service_control_network_fail_open=false".to_string());
    }

    if let Some(url) = input.metadata_url {
        conf_args.push(format!("--metadata_url={url}"));
        bootstrap_args.push(format!("--metadata_url={url}"));
    }

    if let Some(url) = input.iam_url {
        conf_args.push(format!("--iam_url={url}"));
    }

    let impersonation = [
        ("backend_auth_iam_service_account", &options.backend_auth_iam.service_account),
        ("backend_auth_iam_delegates", &options.backend_auth_iam.delegates),
        ("service_control_iam_service_account", &options.service_control_iam.service_account),
        ("service_control_iam_delegates", &options.service_control_iam.delegates),
    ];
    for (flag, value) in impersonation {
        if let Some(value) = value {
            conf_args.push(format!("--{flag}={value}"));
        }
    }

    conf_args.push(format!("--listener_port={}", input.ports.listener_port));
    conf_args.push(format!("--service={}", input.service_name));

    match options.tracing_sample_rate {
        Some(rate) => {
            conf_args.push(format!("--tracing_sample_rate={rate}"));
            conf_args.push(format!("--tracing_stackdriver_address={}", tracing_address(input.ports)));
        }
        None => conf_args.push("--disable_tracing".to_string()),
    }

    if input.debug.bootstrap() {
        bootstrap_args.push("--logtostderr".to_string());
        bootstrap_args.push("--v=1".to_string());
    }

    let address = options
        .backend_address
        .clone()
        .unwrap_or_else(|| backend_address(input.ports, options.backend_kind()));
    if !address.is_empty() {
        conf_args.push("--backend_address".to_string());
        conf_args.push(address);
    }

    DerivedArgs {
        conf_args,
        bootstrap_args,
    }
}

/// Proxy arguments for debug mode and drain time.
///
/// A drain time of zero counts as unset.
pub fn proxy_args(debug: DebugComponents, drain_time_secs: Option<u32>) -> Vec<String> {
    let drain_time_secs = drain_time_secs.filter(|secs| *secs != 0);
    let mut args = Vec::new();
    if debug.envoy() {
        args.push("--log-level".to_string());
        args.push("debug".to_string());
        if drain_time_secs.is_none() {
            args.push("--drain-time-s".to_string());
            args.push("1".to_string());
        }
    }
    if let Some(secs) = drain_time_secs {
        args.push("--drain-time-s".to_string());
        args.push(secs.to_string());
    }
    args
}
