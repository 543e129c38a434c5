use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr};
use tracing::{debug, info};

use crate::alerting::best_effort::best_effort;
use crate::alerting::health_evaluator::{HealthEvaluation, HealthMetrics, ReportedStatus, evaluate};
use crate::alerting::lifecycle::AlertLifecycleManager;
use crate::db::entities::agent;
use crate::db::enums::HealthStatus;
use crate::db::services::agent_service::{self, HealthReportUpdate};
use crate::db::services::health_history_service;
use crate::web::models::agent_protocol_models::OsInfo;

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub reported: ReportedStatus,
    pub os_info: Option<OsInfo>,
    pub metrics: Option<HealthMetrics>,
}

#[derive(Debug, Clone)]
pub struct HealthReportOutcome {
    pub agent: agent::Model,
    pub evaluation: HealthEvaluation,
}

/// Evaluates a report, stores it on the agent and runs the alert side effects.
///
/// Only the agent update is allowed to fail. History, offline-alert clearing and
/// health alerts go through `best_effort`.
pub async fn process_health_report(
    db: &DatabaseConnection,
    alerts: &AlertLifecycleManager,
    agent: &agent::Model,
    report: HealthReport,
) -> Result<HealthReportOutcome, DbErr> {
    let evaluation = evaluate(report.metrics.as_ref(), report.reported);
    let previous = agent.health_status;

    let metrics_json = report
        .metrics
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| DbErr::Custom(format!("Failed to serialize health metrics: {e}")))?;
    let os = report.os_info.unwrap_or_default();
    let update = HealthReportUpdate {
        health_status: Some(evaluation.status),
        metrics: metrics_json,
        hostname: os.hostname,
        os_name: os.name,
        os_version: os.version,
        arch: os.arch,
        agent_version: os.agent_version,
    };
    let updated =
        agent_service::record_liveness(db, agent.id, agent.org_id, Utc::now(), Some(update))
            .await?;

    best_effort(
        "record health history",
        health_history_service::record_health_history(
            db,
            &updated,
            evaluation.status,
            report.metrics.as_ref(),
            &evaluation.issues,
        ),
    )
    .await;
    alerts.clear_offline(&updated).await;

    if previous != evaluation.status || evaluation.status != HealthStatus::Healthy {
        if previous != evaluation.status {
            info!(
                agent_id = %updated.id,
                previous_status = %previous,
                new_status = %evaluation.status,
                issues = evaluation.issues.len(),
                "Agent health changed."
            );
        }
        alerts
            .on_health_transition(
                &updated,
                previous,
                evaluation.status,
                &evaluation.issues,
                report.metrics.as_ref(),
            )
            .await;
    } else {
        debug!(agent_id = %updated.id, "Agent remains healthy.");
    }

    Ok(HealthReportOutcome {
        agent: updated,
        evaluation,
    })
}
