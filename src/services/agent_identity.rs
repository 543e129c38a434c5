//! Maps an agent credential to the agent it identifies.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;

use crate::db::entities::agent;
use crate::db::services::agent_service;

#[async_trait]
pub trait AgentResolver: Send + Sync {
    /// `Ok(None)` means the key is unknown or the agent is disabled.
    async fn resolve(&self, api_key: &str) -> Result<Option<agent::Model>, DbErr>;
}

/// Looks keys up in `agents.api_key`.
pub struct DbAgentResolver {
    db: Arc<DatabaseConnection>,
}

impl DbAgentResolver {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AgentResolver for DbAgentResolver {
    async fn resolve(&self, api_key: &str) -> Result<Option<agent::Model>, DbErr> {
        if api_key.is_empty() {
            return Ok(None);
        }
        agent_service::get_agent_by_api_key(&self.db, api_key).await
    }
}
