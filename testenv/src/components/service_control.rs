//! Mock service control server
//!
//! Records every check and report call so tests can assert on what the proxy
//! sent, and stamps report responses with the current rollout id.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::Json;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

use super::server::MockServer;
use crate::error::{EnvError, EnvResult};

pub const COMPONENT: &str = "mock-service-control";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCall {
    Check,
    Report,
    Quota,
    Other,
}

impl ControlCall {
    fn from_path(path: &str) -> Self {
        match path.rsplit(':').next() {
            Some("check") => ControlCall::Check,
            Some("report") => ControlCall::Report,
            Some("allocateQuota") => ControlCall::Quota,
            _ => ControlCall::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlRequest {
    pub call: ControlCall,
    pub path: String,
    pub body: Bytes,
}

#[derive(Default)]
struct ControlState {
    requests: Mutex<Vec<ControlRequest>>,
    rollout_id: Mutex<String>,
    arrived: Notify,
}

pub struct MockServiceControl {
    server: MockServer,
    state: Arc<ControlState>,
}

impl MockServiceControl {
    pub async fn start(port: u16, rollout_id: &str) -> EnvResult<Self> {
        let state = Arc::new(ControlState {
            rollout_id: Mutex::new(rollout_id.to_string()),
            ..Default::default()
        });
        let app = Router::new().fallback(serve_control).with_state(state.clone());
        let server = MockServer::start(COMPONENT, port, app).await?;

        Ok(Self { server, state })
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Rollout id reported back in report responses
    pub fn set_rollout_id(&self, rollout_id: &str) {
        *self.state.rollout_id.lock().unwrap_or_else(PoisonError::into_inner) = rollout_id.to_string();
    }

    pub fn requests(&self) -> Vec<ControlRequest> {
        self.state.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Wait until at least `count` requests arrived, then take them all
    pub async fn get_requests(&self, count: usize, wait: Duration) -> EnvResult<Vec<ControlRequest>> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.state.arrived.notified();
            {
                let mut requests = self.state.requests.lock().unwrap_or_else(PoisonError::into_inner);
                if requests.len() >= count {
                    return Ok(std::mem::take(&mut *requests));
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                let have = self.state.requests.lock().unwrap_or_else(PoisonError::into_inner).len();
                return Err(EnvError::StartupTimeout {
                    component: format!("{COMPONENT} ({have} of {count} requests)"),
                    timeout: wait,
                });
            }
        }
    }

    pub async fn stop(&self) {
        self.server.stop().await;
    }
}

async fn serve_control(State(state): State<Arc<ControlState>>, uri: Uri, body: Bytes) -> (StatusCode, Json<Value>) {
    let call = ControlCall::from_path(uri.path());
    let response = match call {
        ControlCall::Check => json!({ "checkInfo": { "consumerInfo": { "projectNumber": "123456" } } }),
        ControlCall::Report => {
            let rollout_id = state.rollout_id.lock().unwrap_or_else(PoisonError::into_inner).clone();
            json!({ "serviceRolloutId": rollout_id })
        }
        ControlCall::Quota | ControlCall::Other => json!({}),
    };

    state
        .requests
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(ControlRequest {
            call,
            path: uri.path().to_string(),
            body,
        });
    state.arrived.notify_waiters();

    (StatusCode::OK, Json(response))
}
