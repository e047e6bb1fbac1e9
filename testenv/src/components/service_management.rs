//! Mock service management server
//!
//! Serves the latest rollout and the service configuration straight from the
//! shared service document, so edits made before the config manager fetches
//! them are what it sees.

use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::Utc;
use serde_json::{Map, json};

use super::server::MockServer;
use crate::error::EnvResult;
use crate::service_config::{SharedServiceConfig, read_config};

pub const COMPONENT: &str = "mock-service-management";
pub const INIT_ROLLOUT_ID: &str = "test-rollout-id";

struct ManagementState {
    config: SharedServiceConfig,
    rollout_id: Mutex<String>,
}

pub struct MockServiceManagement {
    server: MockServer,
    state: Arc<ManagementState>,
}

impl MockServiceManagement {
    pub async fn start(port: u16, config: SharedServiceConfig) -> EnvResult<Self> {
        let state = Arc::new(ManagementState {
            config,
            rollout_id: Mutex::new(INIT_ROLLOUT_ID.to_string()),
        });
        let app = Router::new()
            .route("/v1/services/:service/rollouts", get(latest_rollout))
            .route("/v1/services/:service/configs/:config_id", get(service_config))
            .with_state(state.clone());
        let server = MockServer::start(COMPONENT, port, app).await?;

        Ok(Self { server, state })
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn set_rollout_id(&self, rollout_id: &str) {
        *self.state.rollout_id.lock().unwrap_or_else(PoisonError::into_inner) = rollout_id.to_string();
    }

    pub fn rollout_id(&self) -> String {
        self.state.rollout_id.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub async fn stop(&self) {
        self.server.stop().await;
    }
}

async fn latest_rollout(State(state): State<Arc<ManagementState>>, Path(service): Path<String>) -> Response {
    let (name, config_id) = {
        let config = read_config(&state.config);
        (config.name.clone(), config.id.clone())
    };
    if service != name {
        return (StatusCode::NOT_FOUND, format!("unknown service {service}")).into_response();
    }

    let rollout_id = state.rollout_id.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let mut percentages = Map::new();
    percentages.insert(config_id, json!(100.0));
    Json(json!({
        "rollouts": [{
            "rolloutId": rollout_id,
            "createTime": Utc::now().to_rfc3339(),
            "status": "SUCCESS",
            "serviceName": name,
            "trafficPercentStrategy": { "percentages": percentages },
        }]
    }))
    .into_response()
}

async fn service_config(
    State(state): State<Arc<ManagementState>>,
    Path((service, config_id)): Path<(String, String)>,
) -> Response {
    let config = read_config(&state.config).clone();
    if service != config.name || config_id != config.id {
        return (StatusCode::NOT_FOUND, format!("unknown config {service}/{config_id}")).into_response();
    }
    Json(config).into_response()
}
