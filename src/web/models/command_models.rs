use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::entities::agent_command;
use crate::db::enums::{CommandStatus, CommandType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommandRequest {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: Uuid,
    pub agent_id: Uuid,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub payload: Option<Value>,
    pub status: CommandStatus,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<agent_command::Model> for CommandResponse {
    fn from(c: agent_command::Model) -> Self {
        Self {
            id: c.id,
            agent_id: c.agent_id,
            command_type: c.command_type,
            payload: c.payload,
            status: c.status,
            result: c.result,
            error_message: c.error_message,
            created_by: c.created_by,
            created_at: c.created_at,
            acknowledged_at: c.acknowledged_at,
            started_at: c.started_at,
            completed_at: c.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandListResponse {
    pub commands: Vec<CommandResponse>,
}
