//! Backend Configuration
//!
//! Routes the global backend overrides into the one backend variant a test
//! runs, rejecting overrides that variant cannot honour.

use serde::{Deserialize, Serialize};
use shared::BackendKind;

use crate::error::{EnvError, EnvResult};

/// Backend overrides as set on the options builder, before a kind is applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendOverrides {
    /// Serve HTTPS with a certificate the proxy does not trust
    pub use_wrong_backend_cert: bool,
    pub disable_http2_for_https_backend: bool,
    /// Reset every connection instead of answering
    pub always_respond_rst: bool,
    /// Reject the first N requests with `reject_request_status`
    pub reject_request_num: u32,
    pub reject_request_status: u16,
    /// Require client certificates signed by this file
    pub mtls_cert_file: Option<String>,
    pub enable_root_path_handler: bool,
}

impl BackendOverrides {
    /// Names of the overrides that differ from their defaults
    fn set_options(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.use_wrong_backend_cert {
            set.push("use_wrong_backend_cert");
        }
        if self.disable_http2_for_https_backend {
            set.push("disable_http2_for_https_backend");
        }
        if self.always_respond_rst {
            set.push("backend_always_respond_rst");
        }
        if self.reject_request_num != 0 {
            set.push("backend_reject_request_num");
        }
        if self.reject_request_status != 0 {
            set.push("backend_reject_request_status");
        }
        if self.mtls_cert_file.is_some() {
            set.push("backend_mtls_cert_file");
        }
        if self.enable_root_path_handler {
            set.push("enable_echo_server_root_path_handler");
        }
        set
    }
}

/// Flags handed to the HTTP echo backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoServerFlags {
    pub enable_https: bool,
    pub use_wrong_cert: bool,
    pub enable_root_path_handler: bool,
    pub mtls_cert_file: Option<String>,
    pub disable_http2: bool,
    pub always_respond_rst: bool,
    pub reject_request_num: u32,
    pub reject_request_status: u16,
}

/// The backend a test runs, carrying only the settings that variant uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendSpec {
    EchoSidecar(EchoServerFlags),
    EchoRemote(EchoServerFlags),
    GrpcBookstoreSidecar,
    GrpcBookstoreRemote {
        use_wrong_cert: bool,
        mtls_cert_file: Option<String>,
    },
    GrpcInteropSidecar,
    GrpcEchoSidecar,
    GrpcEchoRemote,
}

impl BackendSpec {
    /// Apply `overrides` to `kind`, failing on any override the kind ignores.
    pub fn resolve(kind: BackendKind, overrides: &BackendOverrides) -> EnvResult<Self> {
        let supported: &[&str] = match kind {
            BackendKind::EchoSidecar => &[
                "backend_always_respond_rst",
                "backend_reject_request_num",
                "backend_reject_request_status",
                "backend_mtls_cert_file",
                "enable_echo_server_root_path_handler",
            ],
            BackendKind::EchoRemote => &[
                "use_wrong_backend_cert",
                "disable_http2_for_https_backend",
                "backend_always_respond_rst",
                "backend_reject_request_num",
                "backend_reject_request_status",
                "backend_mtls_cert_file",
                "enable_echo_server_root_path_handler",
            ],
            BackendKind::GrpcBookstoreRemote => &["use_wrong_backend_cert", "backend_mtls_cert_file"],
            BackendKind::GrpcBookstoreSidecar
            | BackendKind::GrpcInteropSidecar
            | BackendKind::GrpcEchoSidecar
            | BackendKind::GrpcEchoRemote => &[],
        };

        if let Some(option) = overrides
            .set_options()
            .into_iter()
            .find(|option| !supported.contains(option))
        {
            return Err(EnvError::InvalidOption {
                option: option.to_string(),
                reason: format!("not supported by backend {kind}"),
            });
        }

        let echo_flags = |enable_https: bool| EchoServerFlags {
            enable_https,
            use_wrong_cert: overrides.use_wrong_backend_cert,
            // The remote echo server always serves `/` so dynamic routing can probe it.
            enable_root_path_handler: enable_https || overrides.enable_root_path_handler,
            mtls_cert_file: overrides.mtls_cert_file.clone(),
            disable_http2: overrides.disable_http2_for_https_backend,
            always_respond_rst: overrides.always_respond_rst,
            reject_request_num: overrides.reject_request_num,
            reject_request_status: overrides.reject_request_status,
        };

        Ok(match kind {
            BackendKind::EchoSidecar => BackendSpec::EchoSidecar(echo_flags(false)),
            BackendKind::EchoRemote => BackendSpec::EchoRemote(echo_flags(true)),
            BackendKind::GrpcBookstoreSidecar => BackendSpec::GrpcBookstoreSidecar,
            BackendKind::GrpcBookstoreRemote => BackendSpec::GrpcBookstoreRemote {
                use_wrong_cert: overrides.use_wrong_backend_cert,
                mtls_cert_file: overrides.mtls_cert_file.clone(),
            },
            BackendKind::GrpcInteropSidecar => BackendSpec::GrpcInteropSidecar,
            BackendKind::GrpcEchoSidecar => BackendSpec::GrpcEchoSidecar,
            BackendKind::GrpcEchoRemote => BackendSpec::GrpcEchoRemote,
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendSpec::EchoSidecar(_) => BackendKind::EchoSidecar,
            BackendSpec::EchoRemote(_) => BackendKind::EchoRemote,
            BackendSpec::GrpcBookstoreSidecar => BackendKind::GrpcBookstoreSidecar,
            BackendSpec::GrpcBookstoreRemote { .. } => BackendKind::GrpcBookstoreRemote,
            BackendSpec::GrpcInteropSidecar => BackendKind::GrpcInteropSidecar,
            BackendSpec::GrpcEchoSidecar => BackendKind::GrpcEchoSidecar,
            BackendSpec::GrpcEchoRemote => BackendKind::GrpcEchoRemote,
        }
    }
}
