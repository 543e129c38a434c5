pub mod agent_identity;
pub mod auth_service;
