//! Typed shapes for the JSON columns of `agent_commands`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::enums::CommandType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupNowPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestartPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_logs: Option<bool>,
}

/// A command payload, one variant per `CommandType`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    BackupNow(BackupNowPayload),
    Update(UpdatePayload),
    Restart(RestartPayload),
    Diagnostics(DiagnosticsPayload),
}

impl CommandPayload {
    /// Validates a raw payload against the shape its command type expects.
    /// A missing or null payload is the variant's default.
    pub fn from_parts(
        command_type: CommandType,
        payload: Option<Value>,
    ) -> Result<Self, serde_json::Error> {
        let payload = match payload {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v) => v,
        };
        Ok(match command_type {
            CommandType::BackupNow => CommandPayload::BackupNow(serde_json::from_value(payload)?),
            CommandType::Update => CommandPayload::Update(serde_json::from_value(payload)?),
            CommandType::Restart => CommandPayload::Restart(serde_json::from_value(payload)?),
            CommandType::Diagnostics => {
                CommandPayload::Diagnostics(serde_json::from_value(payload)?)
            }
        })
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            CommandPayload::BackupNow(_) => CommandType::BackupNow,
            CommandPayload::Update(_) => CommandType::Update,
            CommandPayload::Restart(_) => CommandType::Restart,
            CommandPayload::Diagnostics(_) => CommandType::Diagnostics,
        }
    }

    /// Column value for `agent_commands.payload`; empty payloads are stored as NULL.
    pub fn to_json(&self) -> Result<Option<Value>, serde_json::Error> {
        let value = match self {
            CommandPayload::BackupNow(p) => serde_json::to_value(p)?,
            CommandPayload::Update(p) => serde_json::to_value(p)?,
            CommandPayload::Restart(p) => serde_json::to_value(p)?,
            CommandPayload::Diagnostics(p) => serde_json::to_value(p)?,
        };
        match &value {
            Value::Object(map) if map.is_empty() => Ok(None),
            _ => Ok(Some(value)),
        }
    }
}

/// Structured outcome an agent attaches to a completed command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
