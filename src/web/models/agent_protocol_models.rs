//! Request and response bodies of the agent protocol (`/api/agent/v1`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::alerting::health_evaluator::HealthMetrics;
use crate::db::entities::agent_command;
use crate::db::enums::CommandType;
use crate::db::models::CommandResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsInfo {
    pub hostname: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub arch: Option<String>,
    pub agent_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReportRequest {
    /// One of `healthy`, `unhealthy`, `degraded`.
    pub status: String,
    #[serde(default)]
    pub os_info: Option<OsInfo>,
    #[serde(default)]
    pub metrics: Option<HealthMetrics>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReportResponse {
    pub acknowledged: bool,
    pub server_time: DateTime<Utc>,
    pub agent_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatchRequest {
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogBatchResponse {
    pub acknowledged: bool,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingCommand {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<agent_command::Model> for PendingCommand {
    fn from(command: agent_command::Model) -> Self {
        Self {
            id: command.id,
            command_type: command.command_type,
            payload: command.payload,
            created_at: command.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingCommandsResponse {
    pub commands: Vec<PendingCommand>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcknowledgeResponse {
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResultRequest {
    /// One of `running`, `completed`, `failed`.
    pub status: String,
    #[serde(default)]
    pub result: Option<CommandResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResultResponse {
    pub updated: bool,
}

/// A backup the agent ran while it could not reach the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedBackupEntry {
    /// Agent-local identifier of the queued execution.
    pub id: String,
    /// Kept as text; an unparsable id is a per-entry skip reason.
    pub schedule_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bytes_added: Option<i64>,
    #[serde(default)]
    pub files_new: Option<i32>,
    #[serde(default)]
    pub files_changed: Option<i32>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub repository_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedBackupsRequest {
    /// Decoded per entry during reconciliation.
    pub backups: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedBackupsResponse {
    pub acknowledged: bool,
    pub received: usize,
    pub processed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectRequest {
    pub queued_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconnectResponse {
    pub acknowledged: bool,
    pub alert_created: bool,
}
