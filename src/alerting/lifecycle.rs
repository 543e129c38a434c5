//! Alert side of agent health: raise, deduplicate and resolve.
//!
//! Nothing in here can fail a protocol request. Every store call goes through
//! [`best_effort`], and the public methods return outcomes instead of `Result`.

use serde_json::{Map, Value, json};
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::info;
use uuid::Uuid;

use crate::alerting::best_effort::best_effort;
use crate::alerting::health_evaluator::{HealthIssue, HealthMetrics};
use crate::db::entities::{agent, alert};
use crate::db::enums::{AlertSeverity, AlertType, HealthStatus};
use crate::db::services::alert_service::{self, AGENT_RESOURCE, NewAlert};

pub const FALLBACK_HEALTH_MESSAGE: &str = "Health issues detected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthAlertOutcome {
    /// Recovery: this many open alerts were resolved.
    Resolved(u64),
    Created(Uuid),
    /// An active alert of the same type already covers this agent.
    AlreadyActive,
    /// The store rejected the write; already logged.
    Failed,
}

/// Joins issue messages with `; `, or the generic fallback when there are none.
pub fn compose_health_message(issues: &[HealthIssue]) -> String {
    if issues.is_empty() {
        return FALLBACK_HEALTH_MESSAGE.to_string();
    }
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn health_alert_metadata(
    agent: &agent::Model,
    previous: HealthStatus,
    new: HealthStatus,
    metrics: Option<&HealthMetrics>,
) -> Value {
    let mut metadata = Map::new();
    metadata.insert("hostname".into(), json!(agent.hostname));
    metadata.insert("previous_status".into(), json!(previous));
    metadata.insert("new_status".into(), json!(new));
    if let Some(m) = metrics {
        for (key, value) in [
            ("cpu_usage", m.cpu_usage),
            ("memory_usage", m.memory_usage),
            ("disk_usage", m.disk_usage),
        ] {
            if let Some(v) = value {
                metadata.insert(key.into(), json!(v));
            }
        }
    }
    Value::Object(metadata)
}

#[derive(Clone, Debug)]
pub struct AlertLifecycleManager {
    db: Arc<DatabaseConnection>,
}

impl AlertLifecycleManager {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Applies a health report's alert consequences.
    ///
    /// Healthy resolves every open alert on the agent. Warning and critical raise an
    /// alert of the matching type unless one is already active; a move between the
    /// two unhealthy levels therefore opens a second alert rather than escalating.
    pub async fn on_health_transition(
        &self,
        agent: &agent::Model,
        previous: HealthStatus,
        new: HealthStatus,
        issues: &[HealthIssue],
        metrics: Option<&HealthMetrics>,
    ) -> HealthAlertOutcome {
        let (alert_type, severity, title) = match new {
            HealthStatus::Healthy => {
                let resolved = best_effort(
                    "resolve agent alerts",
                    alert_service::resolve_alerts_for_resource(
                        &self.db,
                        agent.org_id,
                        AGENT_RESOURCE,
                        agent.id,
                        None,
                    ),
                )
                .await;
                return match resolved {
                    Some(count) => {
                        if count > 0 {
                            info!(agent_id = %agent.id, resolved = count, "Agent recovered; alerts resolved.");
                        }
                        HealthAlertOutcome::Resolved(count)
                    }
                    None => HealthAlertOutcome::Failed,
                };
            }
            HealthStatus::Critical => (
                AlertType::AgentHealthCritical,
                AlertSeverity::Critical,
                format!("Agent {} health is critical", agent.hostname),
            ),
            HealthStatus::Warning => (
                AlertType::AgentHealthWarning,
                AlertSeverity::Warning,
                format!("Agent {} health is degraded", agent.hostname),
            ),
        };

        let new_alert = NewAlert {
            org_id: agent.org_id,
            alert_type,
            severity,
            title,
            message: compose_health_message(issues),
            resource_type: AGENT_RESOURCE.to_string(),
            resource_id: agent.id,
            metadata: Some(health_alert_metadata(agent, previous, new, metrics)),
        };

        match best_effort(
            "create health alert",
            alert_service::create_alert_if_absent(&self.db, new_alert),
        )
        .await
        {
            Some(Some(created)) => {
                info!(
                    agent_id = %agent.id,
                    alert_id = %created.id,
                    alert_type = %alert_type,
                    previous_status = %previous,
                    new_status = %new,
                    "Health alert raised."
                );
                HealthAlertOutcome::Created(created.id)
            }
            Some(None) => HealthAlertOutcome::AlreadyActive,
            None => HealthAlertOutcome::Failed,
        }
    }

    /// Records that an agent came back with offline work to sync. Not deduplicated:
    /// every such reconnection is its own event.
    pub async fn on_reconnect_backlog(
        &self,
        agent: &agent::Model,
        queued_count: i64,
    ) -> Option<alert::Model> {
        if queued_count <= 0 {
            return None;
        }
        let new_alert = NewAlert {
            org_id: agent.org_id,
            alert_type: AlertType::AgentReconnectedWithQueue,
            severity: AlertSeverity::Info,
            title: format!("Agent {} reconnected", agent.hostname),
            message: format!(
                "Agent {} reconnected with {queued_count} queued backup(s) pending sync",
                agent.hostname
            ),
            resource_type: AGENT_RESOURCE.to_string(),
            resource_id: agent.id,
            metadata: Some(json!({
                "hostname": agent.hostname,
                "queued_count": queued_count,
            })),
        };
        let created = best_effort(
            "create reconnect alert",
            alert_service::create_alert(&self.db, new_alert),
        )
        .await;
        if let Some(alert) = &created {
            info!(agent_id = %agent.id, alert_id = %alert.id, queued_count, "Reconnect backlog alert raised.");
        }
        created
    }

    pub async fn raise_offline(
        &self,
        agent: &agent::Model,
        offline_after_secs: u64,
    ) -> Option<alert::Model> {
        let last_seen = agent
            .last_seen
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let new_alert = NewAlert {
            org_id: agent.org_id,
            alert_type: AlertType::AgentOffline,
            severity: AlertSeverity::Warning,
            title: format!("Agent {} is offline", agent.hostname),
            message: format!(
                "No contact from agent {} for more than {offline_after_secs} seconds (last seen: {last_seen})",
                agent.hostname
            ),
            resource_type: AGENT_RESOURCE.to_string(),
            resource_id: agent.id,
            metadata: Some(json!({
                "hostname": agent.hostname,
                "last_seen": agent.last_seen,
            })),
        };
        best_effort(
            "create offline alert",
            alert_service::create_alert_if_absent(&self.db, new_alert),
        )
        .await
        .flatten()
    }

    /// Resolves the offline alert once the agent proves it is alive again.
    pub async fn clear_offline(&self, agent: &agent::Model) -> Option<u64> {
        best_effort(
            "resolve offline alert",
            alert_service::resolve_alerts_for_resource(
                &self.db,
                agent.org_id,
                AGENT_RESOURCE,
                agent.id,
                Some(AlertType::AgentOffline),
            ),
        )
        .await
    }
}
