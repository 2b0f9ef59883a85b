#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use haven_api::auth::audit::AuditLogger;
use haven_api::auth::jwt::{JwtConfig, SigningSecrets, TokenCodec};
use haven_api::auth::password::hash_password;
use haven_api::auth::session::{SessionManager, SessionPolicy};
use haven_api::auth::verifier::AccessVerifier;
use haven_api::config::{ServerConfig, SessionConfig};
use haven_api::router::build_app_router;
use haven_api::state::{AppState, MemoryHandles, Stores};

pub const ACCESS_SECRET: &str =
    "test-access-secret-0123456789abcdef0123456789abcdef0123456789abcdef";
pub const REFRESH_SECRET: &str =
    "test-refresh-secret-0123456789abcdef0123456789abcdef0123456789abcdef";

pub const PASSWORD: &str = "correct-horse-battery-staple";

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secrets: SigningSecrets::new(ACCESS_SECRET, REFRESH_SECRET).expect("valid test secrets"),
        issuer: "haven-api".into(),
        audience: "haven-clients".into(),
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: jwt_config(),
        session: SessionConfig::default(),
    }
}

/// A router over in-memory stores plus handles to inspect them.
pub struct TestApp {
    pub router: Router,
    pub stores: MemoryHandles,
}

/// Build the full application router over in-memory stores.
///
/// Uses the same `build_app_router` as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let (stores, handles) = Stores::memory();
    let state = AppState::new(config.clone(), stores);
    TestApp {
        router: build_app_router(state, &config),
        stores: handles,
    }
}

/// Seed a user with [`PASSWORD`] as their password.
pub fn seed_user(stores: &MemoryHandles, user_id: i64, email: &str, role: &str) {
    let hash = hash_password(PASSWORD).expect("hashing should succeed");
    stores.identity.upsert_user(user_id, email, &hash, role, true);
}

/// Session subsystem wired directly over in-memory stores, without HTTP.
pub struct Harness {
    pub sessions: SessionManager,
    pub verifier: AccessVerifier,
    pub stores: MemoryHandles,
}

pub fn harness(policy: SessionPolicy) -> Harness {
    let stores = MemoryHandles::default();
    let codec = Arc::new(TokenCodec::new(&jwt_config()));
    let audit = AuditLogger::new(stores.audit.clone());
    let sessions = SessionManager::new(
        Arc::clone(&codec),
        stores.credentials.clone(),
        stores.identity.clone(),
        audit.clone(),
        policy,
    );
    let verifier = AccessVerifier::new(codec, stores.identity.clone(), audit);
    Harness {
        sessions,
        verifier,
        stores,
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("user-agent", "haven-tests")
        .header("x-forwarded-for", "198.51.100.20");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, None, Some(body)).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
