//! Fake JWT providers
//!
//! A fixed table of identity providers a service description may reference.
//! Each provider that a test asks for gets its own JWKS server on a port from
//! the test's JWT range.

use std::collections::{BTreeMap, BTreeSet};

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};
use shared::{JWT_PORT_COUNT, Ports};
use tracing::{info, warn};

use super::server::MockServer;
use crate::error::{EnvError, EnvResult};
use crate::service_config::AuthProvider;

pub const JWKS_PATH: &str = "/pkey";

/// Public modulus shared by every fake key; tokens are signed out of band.
const FAKE_MODULUS: &str = "u1SU1LfVLPHCozMxH2Mo4lgOEePzNm0tRgeLezV6ffAt0gunVTLw7onLRnrq0_IzW7yWR7QkrmBL7jTKEn5u-qKhbwKfBstIs-bMY2Zkp18gnTxKLxoS2tFczGkPLPgizskuemMghRniWaoLcyehkd3qqGElvW_VDL5AaWTg0nLVkjRo9z-40RQzuVaE8AkAFmxZzow3x-VJYKdjykkJ0iT9wCS0DRTXu269V264Vf_3jvredZiKRkgwlL9xNAwxXFg0x_XFw005UWVRIkdgcKWTjpBP2dPwVZ4WWC-9aGVd-Gyn1o0CLelf4rEjGoXbAAEgAqeGUxrcIlbjXfbcmw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JwksBehavior {
    Valid,
    /// Serves a body that is not a key set
    Invalid,
}

#[derive(Debug, Clone, Copy)]
struct KnownProvider {
    id: &'static str,
    issuer: &'static str,
    audiences: &'static str,
    behavior: JwksBehavior,
}

const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        id: "google_jwt",
        issuer: "api-proxy-testing@cloud.goog",
        audiences: "ok_audience",
        behavior: JwksBehavior::Valid,
    },
    KnownProvider {
        id: "google_service_account",
        issuer: "api-proxy-testing@cloud.goog",
        audiences: "bookstore_test_client.cloud.goog",
        behavior: JwksBehavior::Valid,
    },
    KnownProvider {
        id: "endpoints_jwt",
        issuer: "jwt-client.endpoints.sample.google.com",
        audiences: "",
        behavior: JwksBehavior::Valid,
    },
    KnownProvider {
        id: "test_auth",
        issuer: "es256-issuer",
        audiences: "",
        behavior: JwksBehavior::Valid,
    },
    KnownProvider {
        id: "test_auth_1",
        issuer: "es256-issuer-1",
        audiences: "",
        behavior: JwksBehavior::Valid,
    },
    KnownProvider {
        id: "invalid_jwks_provider",
        issuer: "invalid-jwks-issuer",
        audiences: "",
        behavior: JwksBehavior::Invalid,
    },
];

fn jwks_body(provider: &KnownProvider) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": format!("{}-key", provider.id),
            "n": FAKE_MODULUS,
            "e": "AQAB",
        }]
    })
}

fn jwks_router(provider: KnownProvider) -> Router {
    Router::new().route(
        JWKS_PATH,
        get(move || async move {
            match provider.behavior {
                JwksBehavior::Valid => (StatusCode::OK, jwks_body(&provider).to_string()),
                JwksBehavior::Invalid => (StatusCode::OK, "not a key set".to_string()),
            }
        }),
    )
}

struct RunningProvider {
    descriptor: AuthProvider,
    server: MockServer,
}

#[derive(Default)]
pub struct FakeJwtService {
    running: BTreeMap<String, RunningProvider>,
}

impl FakeJwtService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a JWKS server for every requested provider not already running.
    ///
    /// Ids outside the table are skipped here; attaching them to the service
    /// description reports the error.
    pub async fn setup_jwt(&mut self, provider_ids: &BTreeSet<String>, ports: &Ports) -> EnvResult<()> {
        for id in provider_ids {
            if self.running.contains_key(id) {
                continue;
            }
            let Some(slot) = KNOWN_PROVIDERS.iter().position(|known| known.id == id) else {
                warn!("⚠️ No fake JWT provider named {}", id);
                continue;
            };
            let provider = KNOWN_PROVIDERS[slot];

            let port = jwt_port(ports, slot)?;
            let server = MockServer::start(format!("jwks-{id}"), port, jwks_router(provider)).await?;
            let descriptor = AuthProvider {
                id: provider.id.to_string(),
                issuer: provider.issuer.to_string(),
                jwks_uri: format!("{}{}", server.url(), JWKS_PATH),
                audiences: provider.audiences.to_string(),
            };
            info!("🔑 JWT provider {} serving keys at {}", id, descriptor.jwks_uri);
            self.running.insert(id.clone(), RunningProvider { descriptor, server });
        }
        Ok(())
    }

    /// Descriptor of a provider started by `setup_jwt`
    pub fn provider(&self, provider_id: &str) -> Option<AuthProvider> {
        self.running.get(provider_id).map(|running| running.descriptor.clone())
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub async fn tear_down(&mut self) {
        for (_, running) in std::mem::take(&mut self.running) {
            running.server.stop().await;
        }
    }
}

fn jwt_port(ports: &Ports, slot: usize) -> EnvResult<u16> {
    let offset = u16::try_from(slot)
        .ok()
        .filter(|offset| *offset < JWT_PORT_COUNT)
        .ok_or_else(|| EnvError::InvalidOption {
            option: "jwt provider".to_string(),
            reason: format!("provider slot {slot} exceeds the {JWT_PORT_COUNT} reserved ports"),
        })?;
    Ok(ports.jwt_range_base + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_table_fits_port_range() {
        assert!(KNOWN_PROVIDERS.len() <= JWT_PORT_COUNT as usize);
        let ports = Ports::new(0).unwrap();
        assert_eq!(jwt_port(&ports, 0).unwrap(), ports.jwt_range_base);
        assert!(jwt_port(&ports, JWT_PORT_COUNT as usize).is_err());
    }

    #[tokio::test]
    async fn test_setup_is_idempotent_and_skips_unknown() {
        let ports = Ports::new(1100).unwrap();
        let mut jwt = FakeJwtService::new();
        let ids = BTreeSet::from(["google_jwt".to_string(), "who_knows".to_string()]);

        jwt.setup_jwt(&ids, &ports).await.unwrap();
        jwt.setup_jwt(&ids, &ports).await.unwrap();

        assert_eq!(jwt.running_count(), 1);
        assert!(jwt.provider("who_knows").is_none());

        let provider = jwt.provider("google_jwt").unwrap();
        let keys: Value = reqwest::get(&provider.jwks_uri).await.unwrap().json().await.unwrap();
        assert_eq!(keys["keys"][0]["kid"], "google_jwt-key");

        jwt.tear_down().await;
        assert_eq!(jwt.running_count(), 0);
    }
}
