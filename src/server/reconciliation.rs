//! Import of backups an agent ran while disconnected.
//!
//! A batch is not a transaction. Each entry is checked and stored on its own; a bad
//! entry is logged and skipped, and the caller compares `processed` with `received`.

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr, Set, SqlErr};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::entities::{agent, backup, schedule};
use crate::db::enums::BackupStatus;
use crate::db::services::{backup_service, schedule_service};
use crate::web::models::agent_protocol_models::QueuedBackupEntry;

#[derive(Debug, thiserror::Error)]
pub enum EntrySkip {
    #[error("malformed entry: {0}")]
    MalformedEntry(#[from] serde_json::Error),
    #[error("invalid schedule id '{0}'")]
    InvalidScheduleId(String),
    #[error("schedule {0} not found")]
    ScheduleNotFound(Uuid),
    #[error("schedule {0} belongs to another agent")]
    ForeignSchedule(Uuid),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    pub received: usize,
    pub processed: usize,
}

#[derive(Debug)]
enum EntryOutcome {
    Created(backup::Model),
    AlreadyReconciled,
}

fn positive_i64(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v > 0)
}

fn positive_i32(value: Option<i32>) -> Option<i32> {
    value.filter(|v| *v > 0)
}

/// Builds the backup row for one queued entry. Ownership must already be checked.
///
/// Start and creation times fall back to `scheduled_at`. Counters and the snapshot id
/// are only kept on success, and zero or negative counters are left unset.
pub fn build_backup_record(
    owner: &agent::Model,
    schedule: &schedule::Model,
    entry: &QueuedBackupEntry,
) -> backup::ActiveModel {
    let started_at: DateTime<Utc> = entry.started_at.unwrap_or(entry.scheduled_at);
    let repository_id = entry
        .repository_id
        .as_deref()
        .and_then(|r| Uuid::parse_str(r).ok())
        .or(schedule.repository_id);
    let offline_entry_id = Some(entry.id.trim().to_string()).filter(|id| !id.is_empty());

    let (status, snapshot_id, size_bytes, files_new, files_changed, error_message) = if entry.success {
        (
            BackupStatus::Completed,
            entry.snapshot_id.clone(),
            positive_i64(entry.bytes_added),
            positive_i32(entry.files_new),
            positive_i32(entry.files_changed),
            None,
        )
    } else {
        (
            BackupStatus::Failed,
            None,
            None,
            None,
            None,
            entry.error_message.clone(),
        )
    };

    backup::ActiveModel {
        id: Set(Uuid::new_v4()),
        org_id: Set(owner.org_id),
        schedule_id: Set(schedule.id),
        agent_id: Set(owner.id),
        repository_id: Set(repository_id),
        backup_type: Set(schedule.backup_type),
        status: Set(status),
        snapshot_id: Set(snapshot_id),
        size_bytes: Set(size_bytes),
        files_new: Set(files_new),
        files_changed: Set(files_changed),
        error_message: Set(error_message),
        offline_entry_id: Set(offline_entry_id),
        started_at: Set(started_at),
        completed_at: Set(entry.completed_at),
        created_at: Set(started_at),
    }
}

async fn reconcile_entry(
    db: &DatabaseConnection,
    owner: &agent::Model,
    entry: &QueuedBackupEntry,
) -> Result<EntryOutcome, EntrySkip> {
    let schedule_id = Uuid::parse_str(entry.schedule_id.trim())
        .map_err(|_| EntrySkip::InvalidScheduleId(entry.schedule_id.clone()))?;

    let schedule = schedule_service::get_schedule_by_id(db, schedule_id)
        .await?
        .ok_or(EntrySkip::ScheduleNotFound(schedule_id))?;
    if schedule.agent_id != owner.id {
        return Err(EntrySkip::ForeignSchedule(schedule_id));
    }

    let entry_id = entry.id.trim();
    if !entry_id.is_empty()
        && backup_service::find_reconciled_backup(db, owner.id, entry_id)
            .await?
            .is_some()
    {
        return Ok(EntryOutcome::AlreadyReconciled);
    }

    let record = build_backup_record(owner, &schedule, entry);
    match backup_service::create_backup(db, record).await {
        Ok(created) => Ok(EntryOutcome::Created(created)),
        // A concurrent replay of the same entry won the insert.
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Ok(EntryOutcome::AlreadyReconciled)
        }
        Err(e) => Err(e.into()),
    }
}

/// Reconciles a raw batch. Entries are decoded one at a time so a malformed element
/// is skipped like any other bad entry.
pub async fn reconcile_queued_backups(
    db: &DatabaseConnection,
    owner: &agent::Model,
    entries: &[Value],
) -> ReconcileSummary {
    let mut summary = ReconcileSummary {
        received: entries.len(),
        processed: 0,
    };

    for (index, raw) in entries.iter().enumerate() {
        let entry = match serde_json::from_value::<QueuedBackupEntry>(raw.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    agent_id = %owner.id,
                    index,
                    reason = %EntrySkip::from(e),
                    "Skipping queued backup entry."
                );
                continue;
            }
        };

        match reconcile_entry(db, owner, &entry).await {
            Ok(EntryOutcome::Created(created)) => {
                debug!(
                    agent_id = %owner.id,
                    backup_id = %created.id,
                    entry_id = %entry.id,
                    status = %created.status,
                    "Queued backup reconciled."
                );
                summary.processed += 1;
            }
            Ok(EntryOutcome::AlreadyReconciled) => {
                debug!(agent_id = %owner.id, entry_id = %entry.id, "Queued backup already reconciled.");
                summary.processed += 1;
            }
            Err(skip) => {
                warn!(
                    agent_id = %owner.id,
                    index,
                    entry_id = %entry.id,
                    schedule_id = %entry.schedule_id,
                    reason = %skip,
                    "Skipping queued backup entry."
                );
            }
        }
    }

    info!(
        agent_id = %owner.id,
        received = summary.received,
        processed = summary.processed,
        "Queued backup batch reconciled."
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::BackupType;
    use crate::db::test_support::{insert_agent, insert_schedule, setup_db};
    use chrono::{Duration, TimeZone};
    use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
    use serde_json::json;

    fn scheduled_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap()
    }

    fn entry(id: &str, schedule_id: impl ToString, success: bool) -> QueuedBackupEntry {
        QueuedBackupEntry {
            id: id.to_string(),
            schedule_id: schedule_id.to_string(),
            scheduled_at: scheduled_at(),
            queued_at: scheduled_at() + Duration::minutes(1),
            success,
            started_at: None,
            completed_at: None,
            bytes_added: None,
            files_new: None,
            files_changed: None,
            snapshot_id: None,
            error_message: None,
            repository_id: None,
        }
    }

    fn raw(entries: &[QueuedBackupEntry]) -> Vec<Value> {
        entries.iter().map(|e| serde_json::to_value(e).unwrap()).collect()
    }

    async fn backups_for(db: &DatabaseConnection, agent_id: Uuid) -> Vec<backup::Model> {
        backup::Entity::find()
            .filter(backup::Column::AgentId.eq(agent_id))
            .all(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_failed_entry_defaults_start_to_scheduled_time() {
        let db = setup_db().await;
        let agent = insert_agent(&db, Uuid::new_v4(), "nas-01").await;
        let schedule = insert_schedule(&db, &agent).await;

        let mut failed = entry("q-1", schedule.id, false);
        failed.error_message = Some("disk full".into());
        failed.snapshot_id = Some("ignored".into());

        let summary = reconcile_queued_backups(&db, &agent, &raw(&[failed])).await;
        assert_eq!(summary, ReconcileSummary { received: 1, processed: 1 });

        let stored = backups_for(&db, agent.id).await;
        assert_eq!(stored.len(), 1);
        let backup = &stored[0];
        assert_eq!(backup.status, BackupStatus::Failed);
        assert_eq!(backup.error_message.as_deref(), Some("disk full"));
        assert_eq!(backup.started_at, scheduled_at());
        assert_eq!(backup.created_at, scheduled_at());
        assert_eq!(backup.snapshot_id, None);
        assert_eq!(backup.repository_id, schedule.repository_id);
        assert_eq!(backup.backup_type, BackupType::File);
    }

    #[tokio::test]
    async fn test_bad_entries_are_skipped_and_counted() {
        let db = setup_db().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "nas-01").await;
        let other = insert_agent(&db, org, "nas-02").await;
        let mine = insert_schedule(&db, &agent).await;
        let foreign = insert_schedule(&db, &other).await;

        let entries = vec![
            entry("q-1", mine.id, true),
            entry("q-2", "not-a-uuid", true),
            entry("q-3", Uuid::new_v4(), true),
            entry("q-4", foreign.id, true),
            entry("q-5", mine.id, false),
        ];
        let summary = reconcile_queued_backups(&db, &agent, &raw(&entries)).await;
        assert_eq!(summary, ReconcileSummary { received: 5, processed: 2 });
        assert_eq!(backups_for(&db, agent.id).await.len(), 2);
        assert!(backups_for(&db, other.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_replayed_entries_are_not_duplicated() {
        let db = setup_db().await;
        let agent = insert_agent(&db, Uuid::new_v4(), "nas-01").await;
        let schedule = insert_schedule(&db, &agent).await;
        let batch = vec![entry("q-1", schedule.id, true), entry("q-2", schedule.id, true)];

        let first = reconcile_queued_backups(&db, &agent, &raw(&batch)).await;
        let replay = reconcile_queued_backups(&db, &agent, &raw(&batch)).await;
        assert_eq!(first.processed, 2);
        assert_eq!(replay.processed, 2);
        assert_eq!(backups_for(&db, agent.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_entries_do_not_reject_the_batch() {
        let db = setup_db().await;
        let agent = insert_agent(&db, Uuid::new_v4(), "nas-01").await;
        let schedule = insert_schedule(&db, &agent).await;

        let mut bad_time = serde_json::to_value(entry("q-2", schedule.id, true)).unwrap();
        bad_time["scheduled_at"] = json!("yesterday");
        let mut bad_counter = serde_json::to_value(entry("q-3", schedule.id, true)).unwrap();
        bad_counter["files_new"] = json!(i64::MAX);
        let batch = vec![
            serde_json::to_value(entry("q-1", schedule.id, true)).unwrap(),
            bad_time,
            bad_counter,
            json!("not an object"),
        ];

        let summary = reconcile_queued_backups(&db, &agent, &batch).await;
        assert_eq!(summary, ReconcileSummary { received: 4, processed: 1 });
        let stored = backups_for(&db, agent.id).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].offline_entry_id.as_deref(), Some("q-1"));
    }

    #[tokio::test]
    async fn test_store_failure_skips_only_that_entry() {
        let db = setup_db().await;
        let agent = insert_agent(&db, Uuid::new_v4(), "nas-01").await;
        let schedule = insert_schedule(&db, &agent).await;
        db.execute_unprepared(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON backups \
             WHEN NEW.offline_entry_id = 'boom' \
             BEGIN SELECT RAISE(ABORT, 'boom'); END",
        )
        .await
        .unwrap();

        let batch = vec![
            entry("q-1", schedule.id, true),
            entry("boom", schedule.id, true),
            entry("q-3", schedule.id, false),
        ];
        let summary = reconcile_queued_backups(&db, &agent, &raw(&batch)).await;
        assert_eq!(summary, ReconcileSummary { received: 3, processed: 2 });

        let mut stored: Vec<_> = backups_for(&db, agent.id)
            .await
            .into_iter()
            .filter_map(|b| b.offline_entry_id)
            .collect();
        stored.sort();
        assert_eq!(stored, vec!["q-1".to_string(), "q-3".to_string()]);
    }

    #[tokio::test]
    async fn test_success_record_keeps_only_positive_counters() {
        let db = setup_db().await;
        let agent = insert_agent(&db, Uuid::new_v4(), "nas-01").await;
        let schedule = insert_schedule(&db, &agent).await;
        let explicit_repo = Uuid::new_v4();

        let mut ok = entry("q-1", schedule.id, true);
        ok.started_at = Some(scheduled_at() + Duration::minutes(5));
        ok.completed_at = Some(scheduled_at() + Duration::minutes(9));
        ok.bytes_added = Some(4096);
        ok.files_new = Some(0);
        ok.files_changed = Some(-3);
        ok.snapshot_id = Some("a1b2c3".into());
        ok.error_message = Some("ignored on success".into());
        ok.repository_id = Some(explicit_repo.to_string());

        let record = build_backup_record(&agent, &schedule, &ok);
        assert_eq!(record.status.as_ref(), &BackupStatus::Completed);
        assert_eq!(record.size_bytes.as_ref(), &Some(4096));
        assert_eq!(record.files_new.as_ref(), &None);
        assert_eq!(record.files_changed.as_ref(), &None);
        assert_eq!(record.snapshot_id.as_ref(), &Some("a1b2c3".to_string()));
        assert_eq!(record.error_message.as_ref(), &None);
        assert_eq!(record.repository_id.as_ref(), &Some(explicit_repo));
        assert_eq!(record.started_at.as_ref(), &(scheduled_at() + Duration::minutes(5)));
        assert_eq!(record.completed_at.as_ref(), &Some(scheduled_at() + Duration::minutes(9)));
        assert_eq!(record.offline_entry_id.as_ref(), &Some("q-1".to_string()));
    }

    #[test]
    fn test_invalid_repository_falls_back_to_schedule() {
        let now = Utc::now();
        let owner = agent::Model {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            hostname: "nas-01".into(),
            api_key: "k".into(),
            os_name: None,
            os_version: None,
            arch: None,
            agent_version: None,
            status: crate::db::enums::AgentStatus::Active,
            health_status: crate::db::enums::HealthStatus::Healthy,
            health_metrics: None,
            last_seen: None,
            last_health_check: None,
            created_at: now,
            updated_at: now,
        };
        let schedule = schedule::Model {
            id: Uuid::new_v4(),
            org_id: owner.org_id,
            agent_id: owner.id,
            name: "db".into(),
            backup_type: BackupType::Database,
            repository_id: Some(Uuid::new_v4()),
            cron_expression: "0 3 * * *".into(),
            enabled: true,
            created_at: now,
        };
        let mut e = entry("", schedule.id, true);
        e.repository_id = Some("garbage".into());

        let record = build_backup_record(&owner, &schedule, &e);
        assert_eq!(record.repository_id.as_ref(), &schedule.repository_id);
        assert_eq!(record.backup_type.as_ref(), &BackupType::Database);
        assert_eq!(record.offline_entry_id.as_ref(), &None);
    }
}
