//! Mock instance metadata server

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};

use super::server::MockServer;
use crate::error::EnvResult;

pub const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
pub const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";
pub const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";
pub const ZONE_PATH: &str = "/computeMetadata/v1/instance/zone";

pub const FAKE_TOKEN: &str = r#"{"access_token":"ya29.new","expires_in":3599,"token_type":"Bearer"}"#;
pub const FAKE_ID_TOKEN: &str = "ya29.identity";
pub const FAKE_PROJECT_ID: &str = "test-project";
pub const FAKE_ZONE: &str = "projects/4242424242/zones/test-zone";

fn default_responses() -> HashMap<String, String> {
    HashMap::from([
        (TOKEN_PATH.to_string(), FAKE_TOKEN.to_string()),
        (IDENTITY_PATH.to_string(), FAKE_ID_TOKEN.to_string()),
        (PROJECT_ID_PATH.to_string(), FAKE_PROJECT_ID.to_string()),
        (ZONE_PATH.to_string(), FAKE_ZONE.to_string()),
    ])
}

struct MetadataState {
    responses: HashMap<String, String>,
    failures_left: AtomicU32,
    requests: AtomicU32,
}

pub struct MockMetadata {
    server: MockServer,
    state: Arc<MetadataState>,
}

impl MockMetadata {
    /// Serve the default metadata with `overrides` layered on top.
    ///
    /// The first `failures` requests are answered with 500.
    pub async fn start(port: u16, overrides: HashMap<String, String>, failures: u32) -> EnvResult<Self> {
        let mut responses = default_responses();
        responses.extend(overrides);

        let state = Arc::new(MetadataState {
            responses,
            failures_left: AtomicU32::new(failures),
            requests: AtomicU32::new(0),
        });
        let app = Router::new().fallback(serve_metadata).with_state(state.clone());
        let server = MockServer::start("mock-metadata", port, app).await?;

        Ok(Self { server, state })
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn request_count(&self) -> u32 {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub async fn stop(&self) {
        self.server.stop().await;
    }
}

async fn serve_metadata(State(state): State<Arc<MetadataState>>, uri: Uri) -> (StatusCode, String) {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let failing = state
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "injected metadata failure".to_string());
    }

    match state.responses.get(uri.path()) {
        Some(body) => (StatusCode::OK, body.clone()),
        None => (StatusCode::NOT_FOUND, format!("unknown metadata path {}", uri.path())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overrides_and_failures() {
        let overrides = HashMap::from([(PROJECT_ID_PATH.to_string(), "other-project".to_string())]);
        let metadata = MockMetadata::start(0, overrides, 1).await.unwrap();
        let url = format!("{}{}", metadata.url(), PROJECT_ID_PATH);

        let first = reqwest::get(&url).await.unwrap();
        assert_eq!(first.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        let second = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert_eq!(second, "other-project");

        let zone = reqwest::get(format!("{}{}", metadata.url(), ZONE_PATH)).await.unwrap().text().await.unwrap();
        assert_eq!(zone, FAKE_ZONE);
        assert_eq!(metadata.request_count(), 3);

        metadata.stop().await;
    }
}
