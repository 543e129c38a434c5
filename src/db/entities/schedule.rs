use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::BackupType;

/// Owned by the scheduling subsystem; read-only from the agent protocol.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schedules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub org_id: Uuid,
    #[sea_orm(indexed)]
    pub agent_id: Uuid,
    pub name: String,
    pub backup_type: BackupType,
    pub repository_id: Option<Uuid>,
    pub cron_expression: String,
    pub enabled: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::agent::Entity",
        from = "Column::AgentId",
        to = "super::agent::Column::Id",
        on_delete = "Cascade"
    )]
    Agent,
    #[sea_orm(has_many = "super::backup::Entity")]
    Backup,
}

impl Related<super::agent::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agent.def()
    }
}

impl Related<super::backup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Backup.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
