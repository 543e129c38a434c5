use serde::{Deserialize, Serialize};

use crate::db::entities::{agent_health_history, alert};

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertListResponse {
    pub alerts: Vec<alert::Model>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthHistoryResponse {
    pub history: Vec<agent_health_history::Model>,
}
