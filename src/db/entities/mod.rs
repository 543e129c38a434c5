//! SeaORM entities for the agent coordination tables.

pub mod agent;
pub mod agent_command;
pub mod agent_health_history;
pub mod agent_log;
pub mod alert;
pub mod backup;
pub mod schedule;

