use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::entities::agent;

pub mod agent_protocol_models;
pub mod alert_models;
pub mod command_models;

// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub exp: usize,
}

/// Operator identity, passed to handlers as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub org_id: Uuid,
    pub username: String,
}

/// Agent identity resolved from its API key, passed as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedAgent(pub agent::Model);

impl AuthenticatedAgent {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<u64>,
}
