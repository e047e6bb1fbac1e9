//! Readiness probes
//!
//! Bounded-retry TCP and HTTP probes used by child processes to report
//! readiness and by the health registry after startup.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{EnvError, EnvResult};
use crate::traits::HealthChecker;

pub const DEFAULT_PROBE_ATTEMPTS: u32 = 10;
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// Succeeds once a TCP connection to the address is accepted
#[derive(Debug, Clone)]
pub struct TcpProbe {
    component: String,
    address: String,
    attempts: u32,
    interval: Duration,
}

impl TcpProbe {
    pub fn new(component: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            address: address.into(),
            attempts: DEFAULT_PROBE_ATTEMPTS,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    pub fn with_retries(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.interval = interval;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl HealthChecker for TcpProbe {
    fn component(&self) -> String {
        self.component.clone()
    }

    async fn check_health(&self) -> EnvResult<()> {
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match TcpStream::connect(&self.address).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    debug!("{} probe attempt {} on {} failed: {}", self.component, attempt, self.address, e);
                    last_error = e.to_string();
                }
            }
            if attempt < self.attempts {
                sleep(self.interval).await;
            }
        }

        Err(EnvError::StartupFailed {
            component: self.component.clone(),
            message: format!("{} not accepting connections: {}", self.address, last_error),
        })
    }
}

/// Succeeds once a GET on the URL returns a success status
#[derive(Debug, Clone)]
pub struct HttpProbe {
    component: String,
    url: String,
    attempts: u32,
    interval: Duration,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(component: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            url: url.into(),
            attempts: DEFAULT_PROBE_ATTEMPTS,
            interval: DEFAULT_PROBE_INTERVAL,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_retries(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.interval = interval;
        self
    }
}

#[async_trait]
impl HealthChecker for HttpProbe {
    fn component(&self) -> String {
        self.component.clone()
    }

    async fn check_health(&self) -> EnvResult<()> {
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.client.get(&self.url).timeout(Duration::from_secs(2)).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => last_error = format!("status {}", response.status()),
                Err(e) => last_error = e.to_string(),
            }
            debug!("{} probe attempt {} on {} failed: {}", self.component, attempt, self.url, last_error);
            if attempt < self.attempts {
                sleep(self.interval).await;
            }
        }

        Err(EnvError::StartupFailed {
            component: self.component.clone(),
            message: format!("{} not healthy: {}", self.url, last_error),
        })
    }
}
