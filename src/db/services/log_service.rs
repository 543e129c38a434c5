use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::db::entities::{agent, agent_log};
use crate::db::enums::LogLevel;

#[derive(Debug, Clone)]
pub struct NewAgentLog {
    pub level: LogLevel,
    pub message: String,
    pub component: Option<String>,
    pub metadata: Option<Value>,
    pub logged_at: DateTime<Utc>,
}

/// Stores a batch of agent log lines in one statement. Returns the number stored.
pub async fn insert_agent_logs(
    db: &DatabaseConnection,
    agent: &agent::Model,
    entries: Vec<NewAgentLog>,
) -> Result<usize, DbErr> {
    if entries.is_empty() {
        return Ok(0);
    }
    let now = Utc::now();
    let models = entries.into_iter().map(|entry| agent_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        agent_id: Set(agent.id),
        org_id: Set(agent.org_id),
        level: Set(entry.level),
        message: Set(entry.message),
        component: Set(entry.component),
        metadata: Set(entry.metadata),
        logged_at: Set(entry.logged_at),
        created_at: Set(now),
    });
    let inserted = agent_log::Entity::insert_many(models)
        .exec_without_returning(db)
        .await?;
    Ok(inserted as usize)
}
