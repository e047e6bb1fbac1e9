//! Child Process Management
//!
//! Launches an external binary, waits for it to become ready and stops it with
//! SIGTERM followed by a hard kill once the grace period runs out.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared::logging::{log_error, log_shutdown, log_startup, log_success};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use crate::error::{EnvError, EnvResult};
use crate::traits::{HealthChecker, ManagedProcess};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Without a probe, a process counts as ready once it survives this long
const NO_PROBE_GRACE: Duration = Duration::from_millis(300);

pub struct ChildProcess {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    inherit_output: bool,
    startup_timeout: Duration,
    stop_timeout: Duration,
    readiness: Option<Arc<dyn HealthChecker>>,
    child: Mutex<Option<Child>>,
}

impl ChildProcess {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            inherit_output: false,
            startup_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(5),
            readiness: None,
            child: Mutex::new(None),
        }
    }

    /// Forward stdout and stderr to the harness instead of discarding them
    pub fn inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    pub fn timeouts(mut self, startup: Duration, stop: Duration) -> Self {
        self.startup_timeout = startup;
        self.stop_timeout = stop;
        self
    }

    /// Probe that must pass before `start_and_wait` returns; also reported as the health checker
    pub fn readiness(mut self, probe: Arc<dyn HealthChecker>) -> Self {
        self.readiness = Some(probe);
        self
    }

    fn spawn(&self) -> EnvResult<Child> {
        let (stdout, stderr) = if self.inherit_output {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvError::StartupFailed {
                component: self.name.clone(),
                message: format!("{}: {}", self.program.display(), e),
            })
    }

    /// Fails if the process has already exited
    async fn ensure_alive(&self) -> EnvResult<()> {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Err(EnvError::ProcessExited {
                component: self.name.clone(),
                status: "not running".to_string(),
            });
        };

        match child.try_wait()? {
            Some(status) => Err(EnvError::ProcessExited {
                component: self.name.clone(),
                status: status.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn wait_ready(&self) -> EnvResult<()> {
        let Some(probe) = &self.readiness else {
            sleep(NO_PROBE_GRACE).await;
            return self.ensure_alive().await;
        };

        loop {
            self.ensure_alive().await?;
            if probe.check_health().await.is_ok() {
                return Ok(());
            }
            sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    #[cfg(unix)]
    fn terminate(&self, child: &Child) {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            return;
        };
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => debug!("📤 Sent SIGTERM to {} ({})", self.name, pid),
            Err(nix::errno::Errno::ESRCH) => debug!("{} ({}) already gone", self.name, pid),
            Err(e) => warn!("⚠️ Failed to signal {} ({}): {}", self.name, pid, e),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, _child: &Child) {}
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn start_and_wait(&self) -> EnvResult<()> {
        {
            let mut guard = self.child.lock().await;
            if guard.is_some() {
                return Ok(());
            }
            log_startup(&self.name, &format!("{} {}", self.program.display(), self.args.join(" ")));
            *guard = Some(self.spawn()?);
        }

        let started = Instant::now();
        match timeout(self.startup_timeout, self.wait_ready()).await {
            Ok(Ok(())) => {
                log_success(&self.name, &format!("ready after {:?}", started.elapsed()));
                Ok(())
            }
            Ok(Err(e)) => {
                log_error(&self.name, "readiness check", &e);
                Err(e)
            }
            Err(_) => Err(EnvError::StartupTimeout {
                component: self.name.clone(),
                timeout: self.startup_timeout,
            }),
        }
    }

    async fn stop_and_wait(&self) -> EnvResult<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_some() {
            debug!("{} had already exited", self.name);
            return Ok(());
        }

        log_shutdown(&self.name, "stop requested");
        self.terminate(&child);

        match timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("✅ {} terminated gracefully: {}", self.name, status);
                Ok(())
            }
            Ok(Err(e)) => Err(EnvError::StopFailed {
                component: self.name.clone(),
                message: e.to_string(),
            }),
            Err(_) => {
                warn!("🔨 {} didn't respond to SIGTERM, killing", self.name);
                child.kill().await.map_err(|e| EnvError::StopFailed {
                    component: self.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn health_checker(&self) -> Option<Arc<dyn HealthChecker>> {
        self.readiness.clone()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runtime::probe::TcpProbe;
    use assert_matches::assert_matches;

    fn sleeper(secs: &str) -> ChildProcess {
        ChildProcess::new("sleeper", "sleep", vec![secs.to_string()])
            .timeouts(Duration::from_secs(2), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_start_then_stop_is_idempotent() {
        let process = sleeper("30");
        process.start_and_wait().await.unwrap();

        process.stop_and_wait().await.unwrap();
        process.stop_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        sleeper("30").stop_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_start() {
        let process = ChildProcess::new("ghost", "/nonexistent/testenv-binary", vec![]);
        let err = process.start_and_wait().await.unwrap_err();
        assert_matches!(err, EnvError::StartupFailed { component, .. } if component == "ghost");
    }

    #[tokio::test]
    async fn test_early_exit_is_reported() {
        let process = ChildProcess::new("short", "true", vec![]).timeouts(Duration::from_secs(2), Duration::from_secs(1));
        let err = process.start_and_wait().await.unwrap_err();
        assert_matches!(err, EnvError::ProcessExited { .. });
    }

    #[tokio::test]
    async fn test_probe_that_never_passes_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = Arc::new(TcpProbe::new("sleeper", address).with_retries(1, Duration::ZERO));
        let process = ChildProcess::new("sleeper", "sleep", vec!["30".to_string()])
            .timeouts(Duration::from_millis(500), Duration::from_secs(2))
            .readiness(probe);

        let err = process.start_and_wait().await.unwrap_err();
        assert_matches!(err, EnvError::StartupTimeout { .. });
        process.stop_and_wait().await.unwrap();
    }
}
