//! In-process mock server
//!
//! Every mock management-plane server is an axum router served on a loopback
//! port from a background task, stopped through a oneshot shutdown signal.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use axum::Router;
use shared::LOOPBACK_HOST;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{EnvError, EnvResult};

pub struct MockServer {
    name: String,
    addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
    /// Bind the loopback port and start serving. Port 0 picks a free port.
    pub async fn start(name: impl Into<String>, port: u16, app: Router) -> EnvResult<Self> {
        let name = name.into();
        let listener = TcpListener::bind((LOOPBACK_HOST, port))
            .await
            .map_err(|e| EnvError::StartupFailed {
                component: name.clone(),
                message: format!("bind {LOOPBACK_HOST}:{port}: {e}"),
            })?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            info!("📡 {} listening on {}", task_name, addr);
            let shutdown = async {
                shutdown_rx.await.ok();
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!("{} server error: {}", task_name, e);
            }
        });

        Ok(Self {
            name,
            addr,
            shutdown: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Stop serving and wait for the task. Safe to call more than once.
    pub async fn stop(&self) {
        let sender = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(sender) = sender else {
            return;
        };
        let _ = sender.send(());

        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("{} server task failed: {}", self.name, e);
            }
        }
        debug!("🛑 {} stopped", self.name);
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(sender) = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = sender.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn test_serves_until_stopped() {
        let app = Router::new().route("/ping", get(|| async { "pong" }));
        let server = MockServer::start("ping", 0, app).await.unwrap();

        let body = reqwest::get(format!("{}/ping", server.url())).await.unwrap().text().await.unwrap();
        assert_eq!(body, "pong");

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());
        assert!(reqwest::get(format!("{}/ping", server.url())).await.is_err());
    }
}
