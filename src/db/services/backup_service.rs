use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::db::entities::backup;

pub async fn create_backup(
    db: &DatabaseConnection,
    backup: backup::ActiveModel,
) -> Result<backup::Model, DbErr> {
    backup.insert(db).await
}

/// A backup previously reconciled from the given agent-local queue entry, if any.
pub async fn find_reconciled_backup(
    db: &DatabaseConnection,
    agent_id: Uuid,
    offline_entry_id: &str,
) -> Result<Option<backup::Model>, DbErr> {
    backup::Entity::find()
        .filter(backup::Column::AgentId.eq(agent_id))
        .filter(backup::Column::OfflineEntryId.eq(offline_entry_id))
        .one(db)
        .await
}
