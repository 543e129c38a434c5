use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde_json::Value;
use uuid::Uuid;

use crate::db::entities::agent;
use crate::db::enums::{AgentStatus, HealthStatus};

/// Fields a health report writes back onto the agent row.
#[derive(Debug, Clone, Default)]
pub struct HealthReportUpdate {
    pub health_status: Option<HealthStatus>,
    pub metrics: Option<Value>,
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub arch: Option<String>,
    pub agent_version: Option<String>,
}

/// Resolves an agent API key. Disabled agents do not resolve.
pub async fn get_agent_by_api_key(
    db: &DatabaseConnection,
    api_key: &str,
) -> Result<Option<agent::Model>, DbErr> {
    agent::Entity::find()
        .filter(agent::Column::ApiKey.eq(api_key))
        .filter(agent::Column::Status.ne(AgentStatus::Disabled))
        .one(db)
        .await
}

pub async fn get_agent_for_org(
    db: &DatabaseConnection,
    org_id: Uuid,
    agent_id: Uuid,
) -> Result<Option<agent::Model>, DbErr> {
    agent::Entity::find_by_id(agent_id)
        .filter(agent::Column::OrgId.eq(org_id))
        .one(db)
        .await
}

async fn reload(db: &DatabaseConnection, agent_id: Uuid) -> Result<agent::Model, DbErr> {
    agent::Entity::find_by_id(agent_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("agent {agent_id}")))
}

/// Marks the agent as seen and applies a health report. The owner filter is part of
/// the update itself, so an agent moved to another org concurrently is not touched.
pub async fn record_liveness(
    db: &DatabaseConnection,
    agent_id: Uuid,
    org_id: Uuid,
    now: DateTime<Utc>,
    report: Option<HealthReportUpdate>,
) -> Result<agent::Model, DbErr> {
    let mut update = agent::Entity::update_many()
        .col_expr(agent::Column::LastSeen, Expr::value(now))
        .col_expr(agent::Column::Status, Expr::value(AgentStatus::Active))
        .col_expr(agent::Column::UpdatedAt, Expr::value(now));

    if let Some(report) = report {
        update = update.col_expr(agent::Column::LastHealthCheck, Expr::value(now));
        if let Some(status) = report.health_status {
            update = update.col_expr(agent::Column::HealthStatus, Expr::value(status));
        }
        if let Some(metrics) = report.metrics {
            update = update.col_expr(agent::Column::HealthMetrics, Expr::value(metrics));
        }
        if let Some(hostname) = report.hostname.filter(|h| !h.is_empty()) {
            update = update.col_expr(agent::Column::Hostname, Expr::value(hostname));
        }
        if let Some(v) = report.os_name {
            update = update.col_expr(agent::Column::OsName, Expr::value(v));
        }
        if let Some(v) = report.os_version {
            update = update.col_expr(agent::Column::OsVersion, Expr::value(v));
        }
        if let Some(v) = report.arch {
            update = update.col_expr(agent::Column::Arch, Expr::value(v));
        }
        if let Some(v) = report.agent_version {
            update = update.col_expr(agent::Column::AgentVersion, Expr::value(v));
        }
    }

    let result = update
        .filter(agent::Column::Id.eq(agent_id))
        .filter(agent::Column::OrgId.eq(org_id))
        .filter(agent::Column::Status.ne(AgentStatus::Disabled))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(DbErr::RecordNotFound(format!("agent {agent_id}")));
    }
    reload(db, agent_id).await
}

/// Flips active agents that have not been seen since `cutoff` to offline and returns them.
pub async fn mark_stale_agents_offline(
    db: &DatabaseConnection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<agent::Model>, DbErr> {
    let stale = agent::Entity::find()
        .filter(agent::Column::Status.eq(AgentStatus::Active))
        .filter(agent::Column::LastSeen.lt(cutoff))
        .all(db)
        .await?;

    let mut marked = Vec::with_capacity(stale.len());
    for agent_model in stale {
        // Re-check staleness in the update; the agent may have reported meanwhile.
        let result = agent::Entity::update_many()
            .col_expr(agent::Column::Status, Expr::value(AgentStatus::Offline))
            .col_expr(agent::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(agent::Column::Id.eq(agent_model.id))
            .filter(agent::Column::Status.eq(AgentStatus::Active))
            .filter(agent::Column::LastSeen.lt(cutoff))
            .exec(db)
            .await?;
        if result.rows_affected == 1 {
            marked.push(agent::Model {
                status: AgentStatus::Offline,
                ..agent_model
            });
        }
    }
    Ok(marked)
}
