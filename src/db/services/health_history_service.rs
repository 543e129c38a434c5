use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::alerting::health_evaluator::{HealthIssue, HealthMetrics};
use crate::db::entities::{agent, agent_health_history};
use crate::db::enums::HealthStatus;

pub async fn record_health_history(
    db: &DatabaseConnection,
    agent: &agent::Model,
    health_status: HealthStatus,
    metrics: Option<&HealthMetrics>,
    issues: &[HealthIssue],
) -> Result<agent_health_history::Model, DbErr> {
    let issues_json = serde_json::to_value(issues)
        .map_err(|e| DbErr::Custom(format!("Failed to serialize health issues: {e}")))?;

    agent_health_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        agent_id: Set(agent.id),
        org_id: Set(agent.org_id),
        health_status: Set(health_status),
        cpu_usage: Set(metrics.and_then(|m| m.cpu_usage)),
        memory_usage: Set(metrics.and_then(|m| m.memory_usage)),
        disk_usage: Set(metrics.and_then(|m| m.disk_usage)),
        network_up: Set(metrics.and_then(|m| m.network_up)),
        restic_available: Set(metrics.and_then(|m| m.restic_available)),
        issues: Set(issues_json),
        recorded_at: Set(Utc::now()),
    }
    .insert(db)
    .await
}

/// Most recent entries first.
pub async fn list_health_history(
    db: &DatabaseConnection,
    org_id: Uuid,
    agent_id: Uuid,
    limit: u64,
) -> Result<Vec<agent_health_history::Model>, DbErr> {
    agent_health_history::Entity::find()
        .filter(agent_health_history::Column::AgentId.eq(agent_id))
        .filter(agent_health_history::Column::OrgId.eq(org_id))
        .order_by_desc(agent_health_history::Column::RecordedAt)
        .limit(limit)
        .all(db)
        .await
}
