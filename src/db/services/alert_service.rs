use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr,
};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::db::entities::alert;
use crate::db::enums::{AlertSeverity, AlertStatus, AlertType};

pub const AGENT_RESOURCE: &str = "agent";

#[derive(Debug, thiserror::Error)]
pub enum AlertServiceError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Alert not found: {0}")]
    NotFound(Uuid),
    #[error("Alert cannot move from {from} to {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub org_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub metadata: Option<Value>,
}

pub fn dedup_key(org_id: Uuid, resource_type: &str, resource_id: Uuid, alert_type: AlertType) -> String {
    format!("{org_id}:{resource_type}:{resource_id}:{alert_type}")
}

async fn insert_alert(
    db: &DatabaseConnection,
    new_alert: NewAlert,
    dedup_key: Option<String>,
) -> Result<alert::Model, DbErr> {
    let now = Utc::now();
    alert::ActiveModel {
        id: Set(Uuid::new_v4()),
        org_id: Set(new_alert.org_id),
        alert_type: Set(new_alert.alert_type),
        severity: Set(new_alert.severity),
        title: Set(new_alert.title),
        message: Set(new_alert.message),
        resource_type: Set(new_alert.resource_type),
        resource_id: Set(new_alert.resource_id),
        status: Set(AlertStatus::Active),
        metadata: Set(new_alert.metadata),
        dedup_key: Set(dedup_key),
        created_at: Set(now),
        updated_at: Set(now),
        acknowledged_at: Set(None),
        acknowledged_by: Set(None),
        resolved_at: Set(None),
    }
    .insert(db)
    .await
}

pub async fn find_active_alert(
    db: &DatabaseConnection,
    org_id: Uuid,
    resource_type: &str,
    resource_id: Uuid,
    alert_type: AlertType,
) -> Result<Option<alert::Model>, DbErr> {
    alert::Entity::find()
        .filter(alert::Column::OrgId.eq(org_id))
        .filter(alert::Column::ResourceType.eq(resource_type))
        .filter(alert::Column::ResourceId.eq(resource_id))
        .filter(alert::Column::AlertType.eq(alert_type))
        .filter(alert::Column::Status.eq(AlertStatus::Active))
        .one(db)
        .await
}

/// Records an alert without any deduplication.
pub async fn create_alert(db: &DatabaseConnection, new_alert: NewAlert) -> Result<alert::Model, DbErr> {
    insert_alert(db, new_alert, None).await
}

/// Creates the alert unless one of the same type is already active for the resource.
///
/// Returns `None` when an active alert exists. The lookup is only a fast path;
/// the partial unique index on `dedup_key` settles concurrent inserts.
pub async fn create_alert_if_absent(
    db: &DatabaseConnection,
    new_alert: NewAlert,
) -> Result<Option<alert::Model>, DbErr> {
    let existing = find_active_alert(
        db,
        new_alert.org_id,
        &new_alert.resource_type,
        new_alert.resource_id,
        new_alert.alert_type,
    )
    .await?;
    if let Some(existing) = existing {
        debug!(alert_id = %existing.id, alert_type = %existing.alert_type, "Active alert already exists.");
        return Ok(None);
    }

    let key = dedup_key(
        new_alert.org_id,
        &new_alert.resource_type,
        new_alert.resource_id,
        new_alert.alert_type,
    );
    match insert_alert(db, new_alert, Some(key)).await {
        Ok(model) => Ok(Some(model)),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            debug!("Concurrent insert already created the active alert.");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Resolves every open (active or acknowledged) alert on a resource, optionally of a
/// single type. Returns how many alerts changed.
pub async fn resolve_alerts_for_resource(
    db: &DatabaseConnection,
    org_id: Uuid,
    resource_type: &str,
    resource_id: Uuid,
    alert_type: Option<AlertType>,
) -> Result<u64, DbErr> {
    let now = Utc::now();
    let mut update = alert::Entity::update_many()
        .col_expr(alert::Column::Status, Expr::value(AlertStatus::Resolved))
        .col_expr(alert::Column::ResolvedAt, Expr::value(now))
        .col_expr(alert::Column::UpdatedAt, Expr::value(now))
        .filter(alert::Column::OrgId.eq(org_id))
        .filter(alert::Column::ResourceType.eq(resource_type))
        .filter(alert::Column::ResourceId.eq(resource_id))
        .filter(alert::Column::Status.is_in([AlertStatus::Active, AlertStatus::Acknowledged]));
    if let Some(alert_type) = alert_type {
        update = update.filter(alert::Column::AlertType.eq(alert_type));
    }
    Ok(update.exec(db).await?.rows_affected)
}

pub async fn list_alerts(
    db: &DatabaseConnection,
    org_id: Uuid,
    status: Option<AlertStatus>,
    limit: u64,
) -> Result<Vec<alert::Model>, DbErr> {
    let mut query = alert::Entity::find().filter(alert::Column::OrgId.eq(org_id));
    if let Some(status) = status {
        query = query.filter(alert::Column::Status.eq(status));
    }
    query
        .order_by_desc(alert::Column::CreatedAt)
        .limit(limit)
        .all(db)
        .await
}

pub async fn get_alert_for_org(
    db: &DatabaseConnection,
    org_id: Uuid,
    alert_id: Uuid,
) -> Result<alert::Model, AlertServiceError> {
    alert::Entity::find_by_id(alert_id)
        .filter(alert::Column::OrgId.eq(org_id))
        .one(db)
        .await?
        .ok_or(AlertServiceError::NotFound(alert_id))
}

pub async fn acknowledge_alert(
    db: &DatabaseConnection,
    org_id: Uuid,
    alert_id: Uuid,
    user_id: Uuid,
) -> Result<alert::Model, AlertServiceError> {
    let now = Utc::now();
    let result = alert::Entity::update_many()
        .col_expr(alert::Column::Status, Expr::value(AlertStatus::Acknowledged))
        .col_expr(alert::Column::AcknowledgedAt, Expr::value(now))
        .col_expr(alert::Column::AcknowledgedBy, Expr::value(user_id))
        .col_expr(alert::Column::UpdatedAt, Expr::value(now))
        .filter(alert::Column::Id.eq(alert_id))
        .filter(alert::Column::OrgId.eq(org_id))
        .filter(alert::Column::Status.eq(AlertStatus::Active))
        .exec(db)
        .await?;

    let current = get_alert_for_org(db, org_id, alert_id).await?;
    if result.rows_affected == 0 {
        return Err(AlertServiceError::InvalidTransition {
            from: current.status,
            to: AlertStatus::Acknowledged,
        });
    }
    Ok(current)
}

pub async fn resolve_alert(
    db: &DatabaseConnection,
    org_id: Uuid,
    alert_id: Uuid,
) -> Result<alert::Model, AlertServiceError> {
    let now = Utc::now();
    let result = alert::Entity::update_many()
        .col_expr(alert::Column::Status, Expr::value(AlertStatus::Resolved))
        .col_expr(alert::Column::ResolvedAt, Expr::value(now))
        .col_expr(alert::Column::UpdatedAt, Expr::value(now))
        .filter(alert::Column::Id.eq(alert_id))
        .filter(alert::Column::OrgId.eq(org_id))
        .filter(alert::Column::Status.is_in([AlertStatus::Active, AlertStatus::Acknowledged]))
        .exec(db)
        .await?;

    let current = get_alert_for_org(db, org_id, alert_id).await?;
    if result.rows_affected == 0 {
        return Err(AlertServiceError::InvalidTransition {
            from: current.status,
            to: AlertStatus::Resolved,
        });
    }
    Ok(current)
}
