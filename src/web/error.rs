use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::services::{AlertServiceError, CommandServiceError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {msg}"),
            ),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        if status.is_server_error() {
            error!(status = %status, error = %error_message, "Request failed.");
        }
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::RecordNotFound(what) => AppError::NotFound(format!("{what} not found")),
            other => AppError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON serialization/deserialization error: {err}"))
    }
}

impl From<CommandServiceError> for AppError {
    fn from(err: CommandServiceError) -> Self {
        match err {
            CommandServiceError::DbErr(e) => e.into(),
            CommandServiceError::ValidationError(msg) => AppError::InvalidInput(msg),
            CommandServiceError::AgentNotFound(_) => AppError::NotFound("Agent not found".to_string()),
            CommandServiceError::NotFound(_) => AppError::NotFound("Command not found".to_string()),
            e @ (CommandServiceError::NotPending
            | CommandServiceError::NotAcknowledged
            | CommandServiceError::AlreadyTerminal) => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<AlertServiceError> for AppError {
    fn from(err: AlertServiceError) -> Self {
        match err {
            AlertServiceError::DbErr(e) => e.into(),
            AlertServiceError::NotFound(_) => AppError::NotFound("Alert not found".to_string()),
            e @ AlertServiceError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
        }
    }
}
