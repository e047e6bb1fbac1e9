//! Mock IAM credentials server

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};

use super::server::MockServer;
use crate::config::IamScript;
use crate::error::EnvResult;

pub const DEFAULT_ACCESS_TOKEN: &str = r#"{"accessToken":"default-access-token","expireTime":"2099-01-01T00:00:00Z"}"#;
pub const DEFAULT_ID_TOKEN: &str = r#"{"token":"default-id-token"}"#;

struct IamState {
    resps: HashMap<String, String>,
    failures_left: AtomicU32,
    resp_time: Duration,
    requests: AtomicU32,
}

pub struct MockIam {
    server: MockServer,
    state: Arc<IamState>,
}

impl MockIam {
    pub async fn start(port: u16, script: &IamScript) -> EnvResult<Self> {
        let state = Arc::new(IamState {
            resps: script.resps.clone(),
            failures_left: AtomicU32::new(script.failures),
            resp_time: script.resp_time,
            requests: AtomicU32::new(0),
        });
        let app = Router::new().fallback(serve_iam).with_state(state.clone());
        let server = MockServer::start("mock-iam", port, app).await?;

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

async fn serve_iam(State(state): State<Arc<IamState>>, uri: Uri) -> (StatusCode, String) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !state.resp_time.is_zero() {
        tokio::time::sleep(state.resp_time).await;
    }

    let failing = state
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "injected iam failure".to_string());
    }

    let path = uri.path();
    let body = match state.resps.get(path) {
        Some(body) => body.clone(),
        None if path.ends_with(":generateIdToken") => DEFAULT_ID_TOKEN.to_string(),
        None => DEFAULT_ACCESS_TOKEN.to_string(),
    };
    (StatusCode::OK, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_response_after_failures() {
        let path = "/v1/projects/-/serviceAccounts/backend@example.iam:generateIdToken";
        let script = IamScript {
            resps: HashMap::from([(path.to_string(), r#"{"token":"scripted"}"#.to_string())]),
            failures: 2,
            resp_time: Duration::ZERO,
        };
        let iam = MockIam::start(0, &script).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}{}", iam.url(), path);

        for _ in 0..2 {
            let response = client.post(&url).send().await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        }
        let body = client.post(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, r#"{"token":"scripted"}"#);

        let other = format!("{}/v1/projects/-/serviceAccounts/x:generateAccessToken", iam.url());
        let body = client.post(&other).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, DEFAULT_ACCESS_TOKEN);

        drop(client);
        iam.stop().await;
    }
}
