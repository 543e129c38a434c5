use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use uuid::Uuid;

use crate::db::entities::schedule;

pub async fn get_schedule_by_id(
    db: &DatabaseConnection,
    schedule_id: Uuid,
) -> Result<Option<schedule::Model>, DbErr> {
    schedule::Entity::find_by_id(schedule_id).one(db).await
}
