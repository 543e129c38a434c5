use axum::{
    Json, Router,
    extract::{Extension, Path, State, rejection::JsonRejection},
    routing::{get, post},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::alerting::health_evaluator::ReportedStatus;
use crate::db::enums::LogLevel;
use crate::db::services::command_service::CommandReport;
use crate::db::services::log_service::{self, NewAgentLog};
use crate::server::health_report::{HealthReport, process_health_report};
use crate::server::reconciliation::reconcile_queued_backups;
use crate::server::reconnect::handle_reconnect;
use crate::web::models::AuthenticatedAgent;
use crate::web::models::agent_protocol_models::{
    AcknowledgeResponse, CommandResultRequest, CommandResultResponse, HealthReportRequest,
    HealthReportResponse, LogBatchRequest, LogBatchResponse, PendingCommand,
    PendingCommandsResponse, QueuedBackupsRequest, QueuedBackupsResponse, ReconnectRequest,
    ReconnectResponse,
};
use crate::web::routes::{json_body, parse_id};
use crate::web::{AppState, error::AppError};

pub fn agent_protocol_router() -> Router<Arc<AppState>> {
    Router::<Arc<AppState>>::new()
        .route("/health", post(report_health))
        .route("/logs", post(push_logs))
        .route("/commands", get(poll_commands))
        .route("/commands/{command_id}/ack", post(acknowledge_command))
        .route("/commands/{command_id}/result", post(report_command_result))
        .route("/queued-backups", post(report_queued_backups))
        .route("/reconnect", post(notify_reconnect))
}

async fn report_health(
    Extension(agent): Extension<AuthenticatedAgent>,
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<HealthReportRequest>, JsonRejection>,
) -> Result<Json<HealthReportResponse>, AppError> {
    let request = json_body(body)?;
    let reported = ReportedStatus::parse(&request.status).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "Invalid status '{}': expected healthy, unhealthy or degraded",
            request.status
        ))
    })?;

    let outcome = process_health_report(
        &app_state.db,
        &app_state.alert_manager,
        &agent.0,
        HealthReport {
            reported,
            os_info: request.os_info,
            metrics: request.metrics,
        },
    )
    .await?;

    Ok(Json(HealthReportResponse {
        acknowledged: true,
        server_time: Utc::now(),
        agent_id: outcome.agent.id,
    }))
}

async fn push_logs(
    Extension(agent): Extension<AuthenticatedAgent>,
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<LogBatchRequest>, JsonRejection>,
) -> Result<Json<LogBatchResponse>, AppError> {
    let request = json_body(body)?;
    let received_at = Utc::now();

    // Validate the whole batch before storing any of it.
    let entries = request
        .logs
        .into_iter()
        .enumerate()
        .map(|(index, entry)| -> Result<NewAgentLog, AppError> {
            let level = LogLevel::parse(&entry.level).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Invalid log level '{}' at index {index}",
                    entry.level
                ))
            })?;
            Ok(NewAgentLog {
                level,
                message: entry.message,
                component: entry.component,
                metadata: entry.metadata,
                logged_at: entry.timestamp.unwrap_or(received_at),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let count = log_service::insert_agent_logs(&app_state.db, &agent.0, entries).await?;
    debug!(agent_id = %agent.id(), count, "Agent logs stored.");
    Ok(Json(LogBatchResponse {
        acknowledged: true,
        count,
    }))
}

async fn poll_commands(
    Extension(agent): Extension<AuthenticatedAgent>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<PendingCommandsResponse>, AppError> {
    let commands = app_state
        .command_manager
        .poll_pending(agent.id(), app_state.config.command_poll_limit)
        .await?;
    Ok(Json(PendingCommandsResponse {
        commands: commands.into_iter().map(PendingCommand::from).collect(),
    }))
}

async fn acknowledge_command(
    Extension(agent): Extension<AuthenticatedAgent>,
    State(app_state): State<Arc<AppState>>,
    Path(command_id): Path<String>,
) -> Result<Json<AcknowledgeResponse>, AppError> {
    let command_id = parse_id(&command_id, "command")?;
    app_state
        .command_manager
        .acknowledge(agent.id(), command_id)
        .await?;
    Ok(Json(AcknowledgeResponse { acknowledged: true }))
}

async fn report_command_result(
    Extension(agent): Extension<AuthenticatedAgent>,
    State(app_state): State<Arc<AppState>>,
    Path(command_id): Path<String>,
    body: Result<Json<CommandResultRequest>, JsonRejection>,
) -> Result<Json<CommandResultResponse>, AppError> {
    let command_id = parse_id(&command_id, "command")?;
    let request = json_body(body)?;
    let report = match request.status.as_str() {
        "running" => CommandReport::Running,
        "completed" => CommandReport::Completed(request.result),
        "failed" => CommandReport::Failed(request.error),
        other => {
            return Err(AppError::InvalidInput(format!(
                "Invalid status '{other}': expected running, completed or failed"
            )));
        }
    };

    app_state
        .command_manager
        .report_result(agent.id(), command_id, report)
        .await?;
    Ok(Json(CommandResultResponse { updated: true }))
}

async fn report_queued_backups(
    Extension(agent): Extension<AuthenticatedAgent>,
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<QueuedBackupsRequest>, JsonRejection>,
) -> Result<Json<QueuedBackupsResponse>, AppError> {
    let request = json_body(body)?;
    let summary = reconcile_queued_backups(&app_state.db, &agent.0, &request.backups).await;
    Ok(Json(QueuedBackupsResponse {
        acknowledged: true,
        received: summary.received,
        processed: summary.processed,
    }))
}

async fn notify_reconnect(
    Extension(agent): Extension<AuthenticatedAgent>,
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<ReconnectRequest>, JsonRejection>,
) -> Result<Json<ReconnectResponse>, AppError> {
    let request = json_body(body)?;
    if request.queued_count < 0 {
        return Err(AppError::InvalidInput(
            "queued_count must not be negative".to_string(),
        ));
    }

    let outcome = handle_reconnect(
        &app_state.db,
        &app_state.alert_manager,
        &agent.0,
        request.queued_count,
    )
    .await?;
    if outcome.alert_created {
        info!(agent_id = %agent.id(), queued_count = request.queued_count, "Reconnect with backlog recorded.");
    }
    Ok(Json(ReconnectResponse {
        acknowledged: true,
        alert_created: outcome.alert_created,
    }))
}
