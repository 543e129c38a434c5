//! Router-level test harness.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use crate::db::test_support::setup_db;
use crate::server::config::ServerConfig;
use crate::services::auth_service;
use crate::web::{AppState, create_axum_router};

pub const TEST_JWT_SECRET: &str = "test-secret";

pub async fn test_app() -> (Router, Arc<DatabaseConnection>) {
    let db = Arc::new(setup_db().await);
    let config = Arc::new(ServerConfig::new("sqlite::memory:", TEST_JWT_SECRET));
    let state = Arc::new(AppState::new(db.clone(), config));
    (create_axum_router(state), db)
}

pub fn operator_token(org_id: Uuid) -> String {
    auth_service::create_jwt(Uuid::new_v4(), org_id, "operator", TEST_JWT_SECRET)
        .expect("failed to sign test token")
}

/// Sends one request through the router and returns the status and JSON body
/// (`Value::Null` for an empty body).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("failed to build request");

    let response = app.clone().oneshot(request).await.expect("router failed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}
