use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info, warn};

use crate::alerting::lifecycle::AlertLifecycleManager;
use crate::db::services::agent_service;

/// Marks agents offline when they stop reporting and raises an offline alert.
pub struct LivenessMonitor {
    db: Arc<DatabaseConnection>,
    alerts: AlertLifecycleManager,
    offline_after_secs: u64,
}

/// `None` when the window does not fit a timestamp; nothing is stale then.
fn offline_cutoff(now: DateTime<Utc>, offline_after_secs: u64) -> Option<DateTime<Utc>> {
    let window = i64::try_from(offline_after_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)?;
    now.checked_sub_signed(window)
}

impl LivenessMonitor {
    pub fn new(
        db: Arc<DatabaseConnection>,
        alerts: AlertLifecycleManager,
        offline_after_secs: u64,
    ) -> Self {
        Self {
            db,
            alerts,
            offline_after_secs,
        }
    }

    pub async fn start_periodic_check(self: Arc<Self>, period_seconds: u64) {
        info!(
            interval_seconds = period_seconds,
            offline_after_seconds = self.offline_after_secs,
            "Agent liveness monitor started."
        );
        let mut interval = interval(Duration::from_secs(period_seconds.max(1)));
        loop {
            interval.tick().await;
            match self.run_check_cycle().await {
                Ok(0) => debug!("No stale agents found."),
                Ok(count) => info!(count, "Agents marked offline."),
                Err(e) => error!(error = %e, "Agent liveness check failed."),
            }
        }
    }

    /// One pass: flip stale agents to offline and alert on each. Returns how many flipped.
    pub async fn run_check_cycle(&self) -> Result<usize, DbErr> {
        let Some(cutoff) = offline_cutoff(Utc::now(), self.offline_after_secs) else {
            warn!(
                offline_after_seconds = self.offline_after_secs,
                "Offline window is out of range; skipping liveness check."
            );
            return Ok(0);
        };
        let marked = agent_service::mark_stale_agents_offline(&self.db, cutoff).await?;

        for agent in &marked {
            warn!(
                agent_id = %agent.id,
                hostname = %agent.hostname,
                last_seen = ?agent.last_seen,
                "Agent stopped reporting; marked offline."
            );
            self.alerts.raise_offline(agent, self.offline_after_secs).await;
        }
        Ok(marked.len())
    }
}
