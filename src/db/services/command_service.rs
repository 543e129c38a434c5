use chrono::Utc;
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::entities::{agent, agent_command, schedule};
use crate::db::enums::CommandStatus;
use crate::db::models::{BackupNowPayload, CommandPayload, CommandResult};

pub const DEFAULT_FAILURE_MESSAGE: &str = "Command failed without error details";

#[derive(Debug, thiserror::Error)]
pub enum CommandServiceError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),
    #[error("Command not found: {0}")]
    NotFound(Uuid),
    #[error("Command is not pending")]
    NotPending,
    #[error("Command has not been acknowledged")]
    NotAcknowledged,
    #[error("Command is already in terminal state")]
    AlreadyTerminal,
}

/// What an agent reports about a command it has claimed.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReport {
    Running,
    Completed(Option<CommandResult>),
    Failed(Option<String>),
}

/// Per-agent command queue.
///
/// Every transition is a single conditional `UPDATE` whose `WHERE` clause carries
/// both the owner (agent, and org for operators) and the allowed source states.
/// When nothing matches, the row is re-read only to pick the error, so an agent
/// asking about another agent's command always sees `NotFound`.
#[derive(Clone, Debug)]
pub struct CommandManager {
    db: Arc<DatabaseConnection>,
}

impl CommandManager {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_agent_in_org(&self, org_id: Uuid, agent_id: Uuid) -> Result<agent::Model, CommandServiceError> {
        agent::Entity::find_by_id(agent_id)
            .filter(agent::Column::OrgId.eq(org_id))
            .one(self.db.as_ref())
            .await?
            .ok_or(CommandServiceError::AgentNotFound(agent_id))
    }

    pub async fn create_command(
        &self,
        org_id: Uuid,
        agent_id: Uuid,
        created_by: Uuid,
        payload: CommandPayload,
    ) -> Result<agent_command::Model, CommandServiceError> {
        let agent = self.find_agent_in_org(org_id, agent_id).await?;

        if let CommandPayload::BackupNow(BackupNowPayload { schedule_id: Some(schedule_id) }) = &payload {
            let owned = schedule::Entity::find_by_id(*schedule_id)
                .filter(schedule::Column::AgentId.eq(agent.id))
                .one(self.db.as_ref())
                .await?
                .is_some();
            if !owned {
                return Err(CommandServiceError::ValidationError(format!(
                    "Schedule {schedule_id} does not belong to this agent."
                )));
            }
        }

        let payload_json = payload
            .to_json()
            .map_err(|e| CommandServiceError::ValidationError(format!("Invalid payload: {e}")))?;
        let now = Utc::now();

        let command = agent_command::ActiveModel {
            id: Set(Uuid::new_v4()),
            agent_id: Set(agent.id),
            org_id: Set(agent.org_id),
            command_type: Set(payload.command_type()),
            payload: Set(payload_json),
            status: Set(CommandStatus::Pending),
            result: Set(None),
            error_message: Set(None),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
            acknowledged_at: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(
            command_id = %command.id,
            agent_id = %command.agent_id,
            command_type = %command.command_type,
            "Command queued for agent."
        );
        Ok(command)
    }

    pub async fn list_commands(
        &self,
        org_id: Uuid,
        agent_id: Uuid,
        status: Option<CommandStatus>,
        limit: u64,
    ) -> Result<Vec<agent_command::Model>, CommandServiceError> {
        self.find_agent_in_org(org_id, agent_id).await?;

        let mut query = agent_command::Entity::find()
            .filter(agent_command::Column::AgentId.eq(agent_id))
            .filter(agent_command::Column::OrgId.eq(org_id));
        if let Some(status) = status {
            query = query.filter(agent_command::Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(agent_command::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get_command(
        &self,
        org_id: Uuid,
        agent_id: Uuid,
        command_id: Uuid,
    ) -> Result<agent_command::Model, CommandServiceError> {
        agent_command::Entity::find_by_id(command_id)
            .filter(agent_command::Column::AgentId.eq(agent_id))
            .filter(agent_command::Column::OrgId.eq(org_id))
            .one(self.db.as_ref())
            .await?
            .ok_or(CommandServiceError::NotFound(command_id))
    }

    /// Operator cancel. Allowed from any non-terminal state.
    pub async fn cancel_command(
        &self,
        org_id: Uuid,
        agent_id: Uuid,
        command_id: Uuid,
    ) -> Result<agent_command::Model, CommandServiceError> {
        let now = Utc::now();
        let result = agent_command::Entity::update_many()
            .col_expr(agent_command::Column::Status, Expr::value(CommandStatus::Canceled))
            .col_expr(agent_command::Column::CompletedAt, Expr::value(now))
            .col_expr(agent_command::Column::UpdatedAt, Expr::value(now))
            .filter(agent_command::Column::Id.eq(command_id))
            .filter(agent_command::Column::AgentId.eq(agent_id))
            .filter(agent_command::Column::OrgId.eq(org_id))
            .filter(agent_command::Column::Status.is_in(CommandStatus::non_terminal()))
            .exec(self.db.as_ref())
            .await?;

        let current = self.get_command(org_id, agent_id, command_id).await?;
        if result.rows_affected == 0 {
            return Err(CommandServiceError::AlreadyTerminal);
        }
        info!(command_id = %command_id, agent_id = %agent_id, "Command canceled by operator.");
        Ok(current)
    }

    /// Pending commands for the polling agent, oldest first. Never changes state.
    pub async fn poll_pending(
        &self,
        agent_id: Uuid,
        limit: u64,
    ) -> Result<Vec<agent_command::Model>, CommandServiceError> {
        Ok(agent_command::Entity::find()
            .filter(agent_command::Column::AgentId.eq(agent_id))
            .filter(agent_command::Column::Status.eq(CommandStatus::Pending))
            .order_by_asc(agent_command::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }

    async fn find_for_agent(
        &self,
        agent_id: Uuid,
        command_id: Uuid,
    ) -> Result<agent_command::Model, CommandServiceError> {
        agent_command::Entity::find_by_id(command_id)
            .filter(agent_command::Column::AgentId.eq(agent_id))
            .one(self.db.as_ref())
            .await?
            .ok_or(CommandServiceError::NotFound(command_id))
    }

    /// Claims a pending command. Exactly one of several racing calls wins.
    pub async fn acknowledge(
        &self,
        agent_id: Uuid,
        command_id: Uuid,
    ) -> Result<agent_command::Model, CommandServiceError> {
        let now = Utc::now();
        let result = agent_command::Entity::update_many()
            .col_expr(agent_command::Column::Status, Expr::value(CommandStatus::Acknowledged))
            .col_expr(agent_command::Column::AcknowledgedAt, Expr::value(now))
            .col_expr(agent_command::Column::UpdatedAt, Expr::value(now))
            .filter(agent_command::Column::Id.eq(command_id))
            .filter(agent_command::Column::AgentId.eq(agent_id))
            .filter(agent_command::Column::Status.eq(CommandStatus::Pending))
            .exec(self.db.as_ref())
            .await?;

        let current = self.find_for_agent(agent_id, command_id).await?;
        if result.rows_affected == 0 {
            debug!(command_id = %command_id, status = %current.status, "Acknowledge rejected.");
            return Err(CommandServiceError::NotPending);
        }
        info!(command_id = %command_id, agent_id = %agent_id, "Command acknowledged by agent.");
        Ok(current)
    }

    pub async fn report_result(
        &self,
        agent_id: Uuid,
        command_id: Uuid,
        report: CommandReport,
    ) -> Result<agent_command::Model, CommandServiceError> {
        let now = Utc::now();
        let started_at: SimpleExpr = Func::coalesce([
            Expr::col(agent_command::Column::StartedAt).into(),
            Expr::value(now),
        ])
        .into();

        let mut update = agent_command::Entity::update_many()
            .col_expr(agent_command::Column::UpdatedAt, Expr::value(now))
            .col_expr(agent_command::Column::StartedAt, started_at);

        update = match &report {
            CommandReport::Running => {
                update.col_expr(agent_command::Column::Status, Expr::value(CommandStatus::Running))
            }
            CommandReport::Completed(result) => {
                let result_json = match result {
                    Some(r) => Some(serde_json::to_value(r).map_err(|e| {
                        CommandServiceError::ValidationError(format!("Invalid result: {e}"))
                    })?),
                    None => None,
                };
                update
                    .col_expr(agent_command::Column::Status, Expr::value(CommandStatus::Completed))
                    .col_expr(agent_command::Column::Result, Expr::value(result_json))
                    .col_expr(agent_command::Column::CompletedAt, Expr::value(now))
            }
            CommandReport::Failed(error) => {
                let message = error
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .unwrap_or(DEFAULT_FAILURE_MESSAGE)
                    .to_string();
                update
                    .col_expr(agent_command::Column::Status, Expr::value(CommandStatus::Failed))
                    .col_expr(agent_command::Column::ErrorMessage, Expr::value(message))
                    .col_expr(agent_command::Column::CompletedAt, Expr::value(now))
            }
        };

        let result = update
            .filter(agent_command::Column::Id.eq(command_id))
            .filter(agent_command::Column::AgentId.eq(agent_id))
            .filter(agent_command::Column::Status.is_in([
                CommandStatus::Acknowledged,
                CommandStatus::Running,
            ]))
            .exec(self.db.as_ref())
            .await?;

        let current = self.find_for_agent(agent_id, command_id).await?;
        if result.rows_affected == 0 {
            return Err(if current.status.is_terminal() {
                CommandServiceError::AlreadyTerminal
            } else {
                CommandServiceError::NotAcknowledged
            });
        }
        info!(command_id = %command_id, status = %current.status, "Command result recorded.");
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{RestartPayload, UpdatePayload};
    use crate::db::test_support::{insert_agent, insert_schedule, setup_db};

    async fn manager() -> (CommandManager, Arc<DatabaseConnection>) {
        let db = Arc::new(setup_db().await);
        (CommandManager::new(db.clone()), db)
    }

    fn restart() -> CommandPayload {
        CommandPayload::Restart(RestartPayload::default())
    }

    #[tokio::test]
    async fn test_create_and_poll_is_side_effect_free() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;

        let first = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        let second = manager
            .create_command(
                org,
                agent.id,
                Uuid::new_v4(),
                CommandPayload::Update(UpdatePayload { version: Some("2.1.0".into()) }),
            )
            .await
            .unwrap();
        assert_eq!(first.status, CommandStatus::Pending);

        let poll_one = manager.poll_pending(agent.id, 50).await.unwrap();
        let poll_two = manager.poll_pending(agent.id, 50).await.unwrap();
        assert_eq!(poll_one, poll_two);
        let ids: Vec<Uuid> = poll_one.iter().map(|c| c.id).collect();
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_and_foreign_agents() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;

        let err = manager.create_command(org, Uuid::new_v4(), Uuid::new_v4(), restart()).await;
        assert!(matches!(err, Err(CommandServiceError::AgentNotFound(_))));

        let err = manager.create_command(Uuid::new_v4(), agent.id, Uuid::new_v4(), restart()).await;
        assert!(matches!(err, Err(CommandServiceError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn test_backup_now_requires_owned_schedule() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;
        let other = insert_agent(&db, org, "web-2").await;
        let own_schedule = insert_schedule(&db, &agent).await;
        let foreign_schedule = insert_schedule(&db, &other).await;

        let ok = manager
            .create_command(
                org,
                agent.id,
                Uuid::new_v4(),
                CommandPayload::BackupNow(BackupNowPayload { schedule_id: Some(own_schedule.id) }),
            )
            .await;
        assert!(ok.is_ok());

        let err = manager
            .create_command(
                org,
                agent.id,
                Uuid::new_v4(),
                CommandPayload::BackupNow(BackupNowPayload { schedule_id: Some(foreign_schedule.id) }),
            )
            .await;
        assert!(matches!(err, Err(CommandServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;
        let cmd = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();

        let acked = manager.acknowledge(agent.id, cmd.id).await.unwrap();
        assert_eq!(acked.status, CommandStatus::Acknowledged);
        assert!(acked.acknowledged_at.is_some());
        assert!(manager.poll_pending(agent.id, 50).await.unwrap().is_empty());

        let running = manager.report_result(agent.id, cmd.id, CommandReport::Running).await.unwrap();
        assert_eq!(running.status, CommandStatus::Running);
        let started = running.started_at.expect("started_at set");

        let running_again = manager.report_result(agent.id, cmd.id, CommandReport::Running).await.unwrap();
        assert_eq!(running_again.started_at, Some(started));

        let result = CommandResult { output: Some("restarted".into()), exit_code: Some(0), ..Default::default() };
        let done = manager
            .report_result(agent.id, cmd.id, CommandReport::Completed(Some(result.clone())))
            .await
            .unwrap();
        assert_eq!(done.status, CommandStatus::Completed);
        assert_eq!(done.result, Some(serde_json::to_value(&result).unwrap()));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_result_uses_default_message() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;
        let cmd = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        manager.acknowledge(agent.id, cmd.id).await.unwrap();

        let failed = manager.report_result(agent.id, cmd.id, CommandReport::Failed(None)).await.unwrap();
        assert_eq!(failed.status, CommandStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_pending_only_accepts_acknowledge() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;
        let cmd = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();

        let err = manager.report_result(agent.id, cmd.id, CommandReport::Running).await;
        assert!(matches!(err, Err(CommandServiceError::NotAcknowledged)));
        let unchanged = manager.get_command(org, agent.id, cmd.id).await.unwrap();
        assert_eq!(unchanged.status, CommandStatus::Pending);

        manager.acknowledge(agent.id, cmd.id).await.unwrap();
        let err = manager.acknowledge(agent.id, cmd.id).await;
        assert!(matches!(err, Err(CommandServiceError::NotPending)));
    }

    #[tokio::test]
    async fn test_terminal_commands_reject_everything() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;
        let cmd = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        manager.acknowledge(agent.id, cmd.id).await.unwrap();
        let done = manager
            .report_result(agent.id, cmd.id, CommandReport::Completed(None))
            .await
            .unwrap();

        let err = manager.report_result(agent.id, cmd.id, CommandReport::Failed(Some("late".into()))).await;
        assert!(matches!(err, Err(CommandServiceError::AlreadyTerminal)));
        let err = manager.acknowledge(agent.id, cmd.id).await;
        assert!(matches!(err, Err(CommandServiceError::NotPending)));
        let err = manager.cancel_command(org, agent.id, cmd.id).await;
        assert!(matches!(err, Err(CommandServiceError::AlreadyTerminal)));

        let after = manager.get_command(org, agent.id, cmd.id).await.unwrap();
        assert_eq!(after, done);
    }

    #[tokio::test]
    async fn test_cancel_from_each_non_terminal_state() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;

        let pending = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        let acked = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        manager.acknowledge(agent.id, acked.id).await.unwrap();
        let running = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        manager.acknowledge(agent.id, running.id).await.unwrap();
        manager.report_result(agent.id, running.id, CommandReport::Running).await.unwrap();

        for id in [pending.id, acked.id, running.id] {
            let canceled = manager.cancel_command(org, agent.id, id).await.unwrap();
            assert_eq!(canceled.status, CommandStatus::Canceled);
            let err = manager.report_result(agent.id, id, CommandReport::Completed(None)).await;
            assert!(matches!(err, Err(CommandServiceError::AlreadyTerminal)));
        }
    }

    #[tokio::test]
    async fn test_cross_agent_access_is_not_found() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let owner = insert_agent(&db, org, "web-1").await;
        let intruder = insert_agent(&db, org, "web-2").await;
        let cmd = manager.create_command(org, owner.id, Uuid::new_v4(), restart()).await.unwrap();

        assert!(matches!(
            manager.acknowledge(intruder.id, cmd.id).await,
            Err(CommandServiceError::NotFound(_))
        ));
        assert!(matches!(
            manager.report_result(intruder.id, cmd.id, CommandReport::Running).await,
            Err(CommandServiceError::NotFound(_))
        ));
        assert!(matches!(
            manager.get_command(org, intruder.id, cmd.id).await,
            Err(CommandServiceError::NotFound(_))
        ));
        assert!(matches!(
            manager.cancel_command(Uuid::new_v4(), owner.id, cmd.id).await,
            Err(CommandServiceError::NotFound(_))
        ));
        assert!(manager.poll_pending(intruder.id, 50).await.unwrap().is_empty());

        // Still claimable by its owner after the rejected attempts.
        assert!(manager.acknowledge(owner.id, cmd.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_racing_acknowledgements_have_one_winner() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;
        let cmd = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();

        let (a, b) = tokio::join!(
            manager.acknowledge(agent.id, cmd.id),
            manager.acknowledge(agent.id, cmd.id)
        );
        let wins = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(wins, 1);
        assert!(matches!(a.err().or(b.err()), Some(CommandServiceError::NotPending)));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (manager, db) = manager().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "web-1").await;
        let a = manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        manager.create_command(org, agent.id, Uuid::new_v4(), restart()).await.unwrap();
        manager.acknowledge(agent.id, a.id).await.unwrap();

        let all = manager.list_commands(org, agent.id, None, 50).await.unwrap();
        assert_eq!(all.len(), 2);
        let acked = manager
            .list_commands(org, agent.id, Some(CommandStatus::Acknowledged), 50)
            .await
            .unwrap();
        assert_eq!(acked.len(), 1);
        assert_eq!(acked[0].id, a.id);

        let err = manager.list_commands(Uuid::new_v4(), agent.id, None, 50).await;
        assert!(matches!(err, Err(CommandServiceError::AgentNotFound(_))));
    }
}
