pub mod config;
pub mod health_report;
pub mod liveness_monitor;
pub mod reconciliation;
pub mod reconnect;
