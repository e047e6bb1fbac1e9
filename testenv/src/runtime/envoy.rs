//! Proxy process
//!
//! The proxy needs a bootstrap file before it can start, so starting it is a
//! two-step affair: run the bootstrap helper to completion, then launch the
//! proxy against the file it wrote.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use shared::Ports;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::process::ChildProcess;
use crate::error::{EnvError, EnvResult};
use crate::traits::{HealthChecker, ManagedProcess};

pub const BOOTSTRAP_COMPONENT: &str = "bootstrap";

/// Arguments passed to the bootstrap helper, ending with the output path
pub fn bootstrapper_command_args(bootstrap_args: &[String], ports: &Ports, config_path: &Path) -> Vec<String> {
    let mut args = bootstrap_args.to_vec();
    args.push(format!("--admin_port={}", ports.admin_port));
    args.push(format!("--discovery_port={}", ports.discovery_port));
    args.push(config_path.display().to_string());
    args
}

/// Arguments passed to the proxy itself
pub fn envoy_command_args(envoy_args: &[String], ports: &Ports, config_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-c".to_string(),
        config_path.display().to_string(),
        "--disable-hot-restart".to_string(),
        "--base-id".to_string(),
        ports.test_id.to_string(),
    ];
    args.extend(envoy_args.iter().cloned());
    args
}

pub struct EnvoyProcess {
    bootstrapper: PathBuf,
    bootstrapper_args: Vec<String>,
    config_path: PathBuf,
    inherit_bootstrap_output: bool,
    envoy: ChildProcess,
    listener_probe: Arc<dyn HealthChecker>,
}

impl EnvoyProcess {
    pub fn new(
        bootstrapper: PathBuf,
        bootstrapper_args: Vec<String>,
        config_path: PathBuf,
        envoy: ChildProcess,
        listener_probe: Arc<dyn HealthChecker>,
    ) -> Self {
        Self {
            bootstrapper,
            bootstrapper_args,
            config_path,
            inherit_bootstrap_output: false,
            envoy,
            listener_probe,
        }
    }

    pub fn inherit_bootstrap_output(mut self, inherit: bool) -> Self {
        self.inherit_bootstrap_output = inherit;
        self
    }

    async fn write_bootstrap(&self) -> EnvResult<()> {
        debug!("Generating bootstrap file {}", self.config_path.display());
        let stderr = if self.inherit_bootstrap_output {
            Stdio::inherit()
        } else {
            Stdio::piped()
        };

        let output = Command::new(&self.bootstrapper)
            .args(&self.bootstrapper_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .output()
            .await
            .map_err(|e| EnvError::StartupFailed {
                component: BOOTSTRAP_COMPONENT.to_string(),
                message: format!("{}: {}", self.bootstrapper.display(), e),
            })?;

        if !output.status.success() {
            return Err(EnvError::StartupFailed {
                component: BOOTSTRAP_COMPONENT.to_string(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ManagedProcess for EnvoyProcess {
    fn name(&self) -> String {
        self.envoy.name()
    }

    async fn start_and_wait(&self) -> EnvResult<()> {
        self.write_bootstrap().await?;
        info!("📄 Bootstrap written to {}", self.config_path.display());
        self.envoy.start_and_wait().await
    }

    async fn stop_and_wait(&self) -> EnvResult<()> {
        let result = self.envoy.stop_and_wait().await;
        match tokio::fs::remove_file(&self.config_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️ Failed to remove {}: {}", self.config_path.display(), e),
        }
        result
    }

    fn health_checker(&self) -> Option<Arc<dyn HealthChecker>> {
        Some(self.listener_probe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrapper_args_end_with_output_path() {
        let ports = Ports::new(3).unwrap();
        let path = PathBuf::from("/tmp/testenv-bootstrap-3.json");
        let args = bootstrapper_command_args(&["--metadata_url=http://127.0.0.1:1".to_string()], &ports, &path);

        assert_eq!(args.first().map(String::as_str), Some("--metadata_url=http://127.0.0.1:1"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/testenv-bootstrap-3.json"));
        assert!(args.contains(&format!("--admin_port={}", ports.admin_port)));
    }

    #[test]
    fn test_envoy_args_use_test_id_as_base_id() {
        let ports = Ports::new(9).unwrap();
        let path = PathBuf::from("/tmp/b.json");
        let args = envoy_command_args(&["--log-level".to_string(), "debug".to_string()], &ports, &path);

        assert_eq!(
            args,
            vec!["-c", "/tmp/b.json", "--disable-hot-restart", "--base-id", "9", "--log-level", "debug"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_bootstrapper_aborts_start() {
        let probe: Arc<dyn HealthChecker> = Arc::new(crate::runtime::probe::TcpProbe::new("envoy", "127.0.0.1:1"));
        let envoy = EnvoyProcess::new(
            PathBuf::from("false"),
            vec![],
            std::env::temp_dir().join("testenv-bootstrap-unused.json"),
            ChildProcess::new("envoy", "sleep", vec!["30".to_string()]),
            probe,
        );

        let err = envoy.start_and_wait().await.unwrap_err();
        assert!(matches!(err, EnvError::StartupFailed { component, .. } if component == BOOTSTRAP_COMPONENT));
        envoy.stop_and_wait().await.unwrap();
    }
}
