use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{AgentStatus, HealthStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub org_id: Uuid,
    pub hostname: String,
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub api_key: String,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub arch: Option<String>,
    pub agent_version: Option<String>,
    pub status: AgentStatus,
    pub health_status: HealthStatus,
    /// Latest metrics snapshot as reported by the agent.
    pub health_metrics: Option<Json>,
    pub last_seen: Option<DateTimeUtc>,
    pub last_health_check: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::agent_command::Entity")]
    AgentCommand,
    #[sea_orm(has_many = "super::schedule::Entity")]
    Schedule,
}

impl Related<super::agent_command::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AgentCommand.def()
    }
}

impl Related<super::schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
