//! Fixtures shared by the database-backed unit tests.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use uuid::Uuid;

use crate::db::entities::{agent, schedule};
use crate::db::enums::{AgentStatus, BackupType, HealthStatus};
use crate::db::schema::ensure_schema;

pub async fn setup_db() -> DatabaseConnection {
    // A single pooled connection keeps every query on the same in-memory database.
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt)
        .await
        .expect("failed to open in-memory sqlite");
    ensure_schema(&db).await.expect("failed to create schema");
    db
}

pub async fn insert_agent(db: &DatabaseConnection, org_id: Uuid, hostname: &str) -> agent::Model {
    let now = Utc::now();
    agent::ActiveModel {
        id: Set(Uuid::new_v4()),
        org_id: Set(org_id),
        hostname: Set(hostname.to_owned()),
        api_key: Set(format!("key-{}", Uuid::new_v4())),
        os_name: Set(None),
        os_version: Set(None),
        arch: Set(None),
        agent_version: Set(None),
        status: Set(AgentStatus::Active),
        health_status: Set(HealthStatus::Healthy),
        health_metrics: Set(None),
        last_seen: Set(Some(now - Duration::minutes(1))),
        last_health_check: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to insert agent")
}

pub async fn insert_schedule(db: &DatabaseConnection, owner: &agent::Model) -> schedule::Model {
    schedule::ActiveModel {
        id: Set(Uuid::new_v4()),
        org_id: Set(owner.org_id),
        agent_id: Set(owner.id),
        name: Set("nightly".to_owned()),
        backup_type: Set(BackupType::File),
        repository_id: Set(Some(Uuid::new_v4())),
        cron_expression: Set("0 2 * * *".to_owned()),
        enabled: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to insert schedule")
}
