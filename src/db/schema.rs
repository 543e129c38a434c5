//! Table bootstrap for the coordination tables.
//!
//! Tables are derived from the entity definitions. The partial unique index on
//! `alerts.dedup_key` is the store-level guarantee behind alert deduplication:
//! two racing "create if absent" calls can both pass the application lookup,
//! but only one insert survives the index.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{
    agent, agent_command, agent_health_history, agent_log, alert, backup, schedule,
};

pub const ACTIVE_ALERT_DEDUP_INDEX: &str = "uq_alerts_active_dedup_key";

/// Creates the table and the indexes declared with `#[sea_orm(indexed)]`.
async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;

    for mut index in schema.create_index_from_entity(E::default()) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }
    Ok(())
}

/// Creates every table and index the control plane needs. Safe to run on every start.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    // Parents before children so foreign keys resolve.
    create_table(db, &schema, agent::Entity).await?;
    create_table(db, &schema, schedule::Entity).await?;
    create_table(db, &schema, agent_command::Entity).await?;
    create_table(db, &schema, agent_health_history::Entity).await?;
    create_table(db, &schema, agent_log::Entity).await?;
    create_table(db, &schema, alert::Entity).await?;
    create_table(db, &schema, backup::Entity).await?;

    db.execute_unprepared(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {ACTIVE_ALERT_DEDUP_INDEX} \
         ON alerts (dedup_key) WHERE status = 'active' AND dedup_key IS NOT NULL"
    ))
    .await?;
    db.execute_unprepared(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_backups_agent_offline_entry \
         ON backups (agent_id, offline_entry_id) WHERE offline_entry_id IS NOT NULL",
    )
    .await?;

    info!("Database schema is up to date.");
    Ok(())
}
