use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::warn;

use crate::services::auth_service;
use crate::web::{AppState, error::AppError};

fn bearer_token(req: &Request<AxumBody>) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

/// Operator session check: bearer header first, then the `token` cookie.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .or_else(|| jar.get("token").map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized("Missing session token".to_string()))?;

    let authenticated_user = auth_service::decode_jwt(&token, &state.config.jwt_secret)
        .map_err(|e| {
            warn!(error = ?e, "JWT decoding error during auth middleware.");
            AppError::Unauthorized("Invalid session token".to_string())
        })?;

    req.extensions_mut().insert(authenticated_user);
    Ok(next.run(req).await)
}

/// Agent API-key check for the protocol routes.
pub async fn agent_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = bearer_token(&req)
        .ok_or_else(|| AppError::Unauthorized("Missing agent API key".to_string()))?;

    let agent = state
        .agent_resolver
        .resolve(&api_key)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid agent API key".to_string()))?;

    req.extensions_mut()
        .insert(crate::web::models::AuthenticatedAgent(agent));
    Ok(next.run(req).await)
}
