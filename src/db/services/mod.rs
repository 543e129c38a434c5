//! Data access for the agent coordination tables.
//!
//! Each sub-module owns one table. Handlers and protocol logic go through these
//! functions rather than building queries themselves.

pub mod agent_service;
pub mod alert_service;
pub mod backup_service;
pub mod command_service;
pub mod health_history_service;
pub mod log_service;
pub mod schedule_service;

pub use alert_service::AlertServiceError;
pub use command_service::{CommandManager, CommandServiceError};
