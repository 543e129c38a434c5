use axum::{
    Json, Router,
    http::Method,
    middleware as axum_middleware,
    routing::get,
};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::alerting::lifecycle::AlertLifecycleManager;
use crate::db::services::CommandManager;
use crate::server::config::ServerConfig;
use crate::services::agent_identity::{AgentResolver, DbAgentResolver};
use crate::version::VERSION;
use crate::web::middleware::auth;
use crate::web::routes::*;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

#[cfg(test)]
pub mod test_support;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<ServerConfig>,
    pub agent_resolver: Arc<dyn AgentResolver>,
    pub command_manager: Arc<CommandManager>,
    pub alert_manager: AlertLifecycleManager,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<ServerConfig>) -> Self {
        Self {
            agent_resolver: Arc::new(DbAgentResolver::new(db.clone())),
            command_manager: Arc::new(CommandManager::new(db.clone())),
            alert_manager: AlertLifecycleManager::new(db.clone()),
            db,
            config,
        }
    }
}

async fn health_check_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "version": VERSION }))
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest(
            "/api/agent/v1",
            agent_protocol_routes::agent_protocol_router().route_layer(
                axum_middleware::from_fn_with_state(app_state.clone(), auth::agent_auth),
            ),
        )
        .nest(
            "/api/agents",
            command_routes::command_router().route_layer(axum_middleware::from_fn_with_state(
                app_state.clone(),
                auth::auth,
            )),
        )
        .nest(
            "/api/alerts",
            alert_routes::alert_router().route_layer(axum_middleware::from_fn_with_state(
                app_state.clone(),
                auth::auth,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
