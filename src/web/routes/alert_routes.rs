use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    routing::{get, post},
};
use sea_orm::ActiveEnum;
use std::sync::Arc;
use tracing::info;

use crate::db::entities::alert;
use crate::db::enums::AlertStatus;
use crate::db::services::alert_service;
use crate::web::models::alert_models::AlertListResponse;
use crate::web::models::{AuthenticatedUser, ListQuery};
use crate::web::routes::{list_limit, parse_id};
use crate::web::{AppState, error::AppError};

pub fn alert_router() -> Router<Arc<AppState>> {
    Router::<Arc<AppState>>::new()
        .route("/", get(list_alerts))
        .route("/{alert_id}/acknowledge", post(acknowledge_alert))
        .route("/{alert_id}/resolve", post(resolve_alert))
}

async fn list_alerts(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<AlertListResponse>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            AlertStatus::try_from_value(&s.to_string())
                .map_err(|_| AppError::InvalidInput(format!("Invalid status filter '{s}'")))
        })
        .transpose()?;
    let alerts =
        alert_service::list_alerts(&app_state.db, user.org_id, status, list_limit(query.limit))
            .await?;
    Ok(Json(AlertListResponse { alerts }))
}

async fn acknowledge_alert(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
) -> Result<Json<alert::Model>, AppError> {
    let alert_id = parse_id(&alert_id, "alert")?;
    let alert = alert_service::acknowledge_alert(&app_state.db, user.org_id, alert_id, user.id).await?;
    info!(alert_id = %alert.id, user_id = %user.id, "Alert acknowledged.");
    Ok(Json(alert))
}

async fn resolve_alert(
    Extension(user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(alert_id): Path<String>,
) -> Result<Json<alert::Model>, AppError> {
    let alert_id = parse_id(&alert_id, "alert")?;
    let alert = alert_service::resolve_alert(&app_state.db, user.org_id, alert_id).await?;
    info!(alert_id = %alert.id, user_id = %user.id, "Alert resolved by operator.");
    Ok(Json(alert))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::alerting::lifecycle::AlertLifecycleManager;
    use crate::db::enums::HealthStatus;
    use crate::db::test_support::insert_agent;
    use crate::web::test_support::{operator_token, send, test_app};

    #[tokio::test]
    async fn test_acknowledge_then_resolve() {
        let (app, db) = test_app().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "srv-1").await;
        AlertLifecycleManager::new(Arc::clone(&db))
            .on_health_transition(&agent, HealthStatus::Healthy, HealthStatus::Critical, &[], None)
            .await;
        let token = operator_token(org);

        let (status, body) = send(&app, "GET", "/api/alerts?status=active", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let alerts = body["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].get("dedup_key").is_none());
        let id = alerts[0]["id"].as_str().unwrap().to_string();

        let (status, acked) = send(&app, "POST", &format!("/api/alerts/{id}/acknowledge"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(acked["status"], json!("acknowledged"));
        assert!(acked["acknowledged_by"].is_string());

        let (status, _) = send(&app, "POST", &format!("/api/alerts/{id}/acknowledge"), Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, resolved) = send(&app, "POST", &format!("/api/alerts/{id}/resolve"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["status"], json!("resolved"));
        let (status, _) = send(&app, "POST", &format!("/api/alerts/{id}/resolve"), Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_alerts_are_org_scoped() {
        let (app, db) = test_app().await;
        let org = Uuid::new_v4();
        let agent = insert_agent(&db, org, "srv-1").await;
        let alert = AlertLifecycleManager::new(Arc::clone(&db))
            .on_reconnect_backlog(&agent, 2)
            .await
            .unwrap();
        let outsider = operator_token(Uuid::new_v4());

        let (status, body) = send(&app, "GET", "/api/alerts", Some(&outsider), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["alerts"].as_array().unwrap().is_empty());

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/alerts/{}/resolve", alert.id),
            Some(&outsider),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "POST", "/api/alerts/bogus/resolve", Some(&outsider), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
