use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr};
use tracing::info;

use crate::alerting::lifecycle::AlertLifecycleManager;
use crate::db::entities::agent;
use crate::db::services::agent_service;

#[derive(Debug, Clone)]
pub struct ReconnectOutcome {
    pub agent: agent::Model,
    pub alert_created: bool,
}

/// Handles an agent announcing it is back online with `queued_count` offline runs.
///
/// Refreshing last-seen is the only step that can fail the call. Clearing the
/// offline alert and raising the backlog alert are best-effort.
pub async fn handle_reconnect(
    db: &DatabaseConnection,
    alerts: &AlertLifecycleManager,
    agent: &agent::Model,
    queued_count: i64,
) -> Result<ReconnectOutcome, DbErr> {
    let refreshed =
        agent_service::record_liveness(db, agent.id, agent.org_id, Utc::now(), None).await?;

    alerts.clear_offline(&refreshed).await;
    let alert_created = alerts
        .on_reconnect_backlog(&refreshed, queued_count)
        .await
        .is_some();

    info!(
        agent_id = %refreshed.id,
        queued_count,
        alert_created,
        "Agent reconnected."
    );
    Ok(ReconnectOutcome {
        agent: refreshed,
        alert_created,
    })
}
