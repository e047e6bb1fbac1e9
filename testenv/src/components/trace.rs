//! Fake trace collector
//!
//! Accepts span batches on the trace export RPC path and keeps them until the
//! test retrieves them. At teardown it checks that tracing produced exactly
//! what the test expected.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::debug;
use uuid::Uuid;

use super::server::MockServer;
use crate::error::{EnvError, EnvResult};
use crate::traits::{HealthChecker, InvariantVerifier};

pub const COMPONENT: &str = "fake-trace-collector";
pub const BATCH_WRITE_SPANS_PATH: &str = "/google.devtools.cloudtrace.v2.TraceService/BatchWriteSpans";

/// Length-prefixed empty message: no compression, zero length
const EMPTY_GRPC_MESSAGE: [u8; 5] = [0, 0, 0, 0, 0];

#[derive(Debug, Clone)]
pub struct TraceBatch {
    pub batch_id: Uuid,
    pub received_at: DateTime<Utc>,
    /// Encoded request, still framed
    pub payload: Bytes,
}

#[derive(Default)]
struct TraceState {
    received: Mutex<Vec<TraceBatch>>,
    retrieved: Mutex<usize>,
    arrived: Notify,
}

pub struct FakeTraceServer {
    server: MockServer,
    state: Arc<TraceState>,
    tracing_enabled: bool,
}

impl FakeTraceServer {
    pub async fn start(port: u16, tracing_enabled: bool) -> EnvResult<Self> {
        let state = Arc::new(TraceState::default());
        let app = Router::new()
            .route(BATCH_WRITE_SPANS_PATH, post(batch_write_spans))
            .with_state(state.clone());
        let server = MockServer::start(COMPONENT, port, app).await?;

        Ok(Self {
            server,
            state,
            tracing_enabled,
        })
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn received_count(&self) -> usize {
        self.state.received.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait for the next `count` batches that the test has not yet seen
    pub async fn retrieve_batches(&self, count: usize, wait: Duration) -> EnvResult<Vec<TraceBatch>> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.state.arrived.notified();
            {
                let received = self.state.received.lock().unwrap_or_else(PoisonError::into_inner);
                let mut retrieved = self.state.retrieved.lock().unwrap_or_else(PoisonError::into_inner);
                if received.len() >= *retrieved + count {
                    let batches = received[*retrieved..*retrieved + count].to_vec();
                    *retrieved += count;
                    return Ok(batches);
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Err(EnvError::StartupTimeout {
                    component: format!("{COMPONENT} ({count} batches)"),
                    timeout: wait,
                });
            }
        }
    }

    pub async fn stop(&self) {
        self.server.stop().await;
    }
}

async fn batch_write_spans(State(state): State<Arc<TraceState>>, body: Bytes) -> impl IntoResponse {
    let batch = TraceBatch {
        batch_id: Uuid::new_v4(),
        received_at: Utc::now(),
        payload: body,
    };
    debug!("Received trace batch {} ({} bytes)", batch.batch_id, batch.payload.len());
    state.received.lock().unwrap_or_else(PoisonError::into_inner).push(batch);
    state.arrived.notify_waiters();

    // Status rides in the headers since the fake has no trailer support.
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/grpc")),
            (HeaderName::from_static("grpc-status"), HeaderValue::from_static("0")),
        ],
        Bytes::from_static(&EMPTY_GRPC_MESSAGE),
    )
}

#[async_trait]
impl InvariantVerifier for FakeTraceServer {
    fn verifier(&self) -> String {
        COMPONENT.to_string()
    }

    async fn verify_invariants(&self) -> EnvResult<()> {
        let received = self.received_count();
        let retrieved = *self.state.retrieved.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.tracing_enabled && received > 0 {
            return Err(EnvError::InvariantViolated {
                verifier: COMPONENT.to_string(),
                message: format!("tracing is disabled but {received} span batches were received"),
            });
        }
        if received > retrieved {
            return Err(EnvError::InvariantViolated {
                verifier: COMPONENT.to_string(),
                message: format!("{} span batches were received but never checked by the test", received - retrieved),
            });
        }
        Ok(())
    }

    fn health_checker(&self) -> Option<Arc<dyn HealthChecker>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    async fn send_batch(url: &str) {
        let response = reqwest::Client::new()
            .post(format!("{url}{BATCH_WRITE_SPANS_PATH}"))
            .header("content-type", "application/grpc")
            .body(vec![0u8, 0, 0, 0, 0])
            .send()
            .await
            .unwrap();
        assert_eq!(response.headers()["grpc-status"], "0");
    }

    #[tokio::test]
    async fn test_disabled_tracing_expects_no_batches() {
        let trace = FakeTraceServer::start(0, false).await.unwrap();
        trace.verify_invariants().await.unwrap();

        send_batch(&trace.url()).await;
        assert_matches!(trace.verify_invariants().await, Err(EnvError::InvariantViolated { .. }));
        trace.stop().await;
    }

    #[tokio::test]
    async fn test_enabled_tracing_requires_retrieval() {
        let trace = FakeTraceServer::start(0, true).await.unwrap();
        send_batch(&trace.url()).await;
        send_batch(&trace.url()).await;

        let first = trace.retrieve_batches(1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(trace.verify_invariants().await.is_err());

        let second = trace.retrieve_batches(1, Duration::from_secs(1)).await.unwrap();
        assert_ne!(first[0].batch_id, second[0].batch_id);
        trace.verify_invariants().await.unwrap();

        assert!(trace.retrieve_batches(1, Duration::from_millis(50)).await.is_err());
        trace.stop().await;
    }
}
