use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use sea_orm::ActiveEnum;
use std::sync::Arc;

use crate::db::enums::{CommandStatus, CommandType};
use crate::db::models::CommandPayload;
use crate::db::services::{agent_service, health_history_service};
use crate::web::models::alert_models::HealthHistoryResponse;
use crate::web::models::command_models::{CommandListResponse, CommandResponse, CreateCommandRequest};
use crate::web::models::{AuthenticatedUser, ListQuery};
use crate::web::routes::{json_body, list_limit, parse_id};
use crate::web::{AppState, error::AppError};

pub fn command_router() -> Router<Arc<AppState>> {
    Router::<Arc<AppState>>::new()
        .route("/{agent_id}/commands", get(list_commands).post(create_command))
        .route("/{agent_id}/commands/{command_id}", get(get_command))
        .route("/{agent_id}/commands/{command_id}/cancel", post(cancel_command))
        .route("/{agent_id}/health-history", get(get_health_history))
}

fn parse_command_type(raw: &str) -> Result<CommandType, AppError> {
    CommandType::try_from_value(&raw.to_string()).map_err(|_| {
        AppError::InvalidInput(format!(
            "Invalid command type '{raw}': expected backup_now, update, restart or diagnostics"
        ))
    })
}

async fn list_commands(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CommandListResponse>, AppError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            CommandStatus::try_from_value(&s.to_string())
                .map_err(|_| AppError::InvalidInput(format!("Invalid status filter '{s}'")))
        })
        .transpose()?;

    let commands = app_state
        .command_manager
        .list_commands(user.org_id, agent_id, status, list_limit(query.limit))
        .await?;
    Ok(Json(CommandListResponse {
        commands: commands.into_iter().map(CommandResponse::from).collect(),
    }))
}

async fn create_command(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    body: Result<Json<CreateCommandRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommandResponse>), AppError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let request = json_body(body)?;
    let command_type = parse_command_type(&request.command_type)?;
    let payload = CommandPayload::from_parts(command_type, request.payload).map_err(|e| {
        AppError::InvalidInput(format!("Invalid payload for {command_type}: {e}"))
    })?;

    let command = app_state
        .command_manager
        .create_command(user.org_id, agent_id, user.id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(command.into())))
}

async fn get_command(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path((agent_id, command_id)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, AppError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let command_id = parse_id(&command_id, "command")?;
    let command = app_state
        .command_manager
        .get_command(user.org_id, agent_id, command_id)
        .await?;
    Ok(Json(command.into()))
}

async fn cancel_command(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path((agent_id, command_id)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, AppError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    let command_id = parse_id(&command_id, "command")?;
    let command = app_state
        .command_manager
        .cancel_command(user.org_id, agent_id, command_id)
        .await?;
    Ok(Json(command.into()))
}

async fn get_health_history(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<HealthHistoryResponse>, AppError> {
    let agent_id = parse_id(&agent_id, "agent")?;
    agent_service::get_agent_for_org(&app_state.db, user.org_id, agent_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Agent not found".to_string()))?;

    let history = health_history_service::list_health_history(
        &app_state.db,
        user.org_id,
        agent_id,
        list_limit(query.limit),
    )
    .await?;
    Ok(Json(HealthHistoryResponse { history }))
}
