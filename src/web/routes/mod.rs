use axum::{Json, extract::rejection::JsonRejection};
use uuid::Uuid;

use crate::web::error::AppError;

pub mod agent_protocol_routes;
pub mod alert_routes;
pub mod command_routes;

pub const DEFAULT_LIST_LIMIT: u64 = 100;
pub const MAX_LIST_LIMIT: u64 = 500;

/// Parses an identifier taken from a path segment. Malformed ids are a client error.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::InvalidInput(format!("Invalid {what} id: {raw}")))
}

/// Unwraps a JSON body, reporting malformed input as 400.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::InvalidInput(rejection.body_text()))
}

pub fn list_limit(requested: Option<u64>) -> u64 {
    requested.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}
