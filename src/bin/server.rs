use backup_control_plane::alerting::lifecycle::AlertLifecycleManager;
use backup_control_plane::db::schema::ensure_schema;
use backup_control_plane::server::config::ServerConfig;
use backup_control_plane::server::liveness_monitor::LivenessMonitor;
use backup_control_plane::version::VERSION;
use backup_control_plane::web::{AppState, create_axum_router};

use clap::Parser;
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting backup control plane, version: {}", VERSION);

    // --- Database Setup ---
    let mut opt = ConnectOptions::new(server_config.database_url.to_owned());
    opt.max_connections(10).sqlx_logging(false);
    let db = Arc::new(Database::connect(opt).await?);
    ensure_schema(&db).await?;

    let app_state = Arc::new(AppState::new(db.clone(), server_config.clone()));

    // --- Agent Liveness Monitor ---
    let liveness_monitor = Arc::new(LivenessMonitor::new(
        db.clone(),
        AlertLifecycleManager::new(db.clone()),
        server_config.agent_offline_after_secs,
    ));
    let check_interval = server_config.liveness_check_interval_secs;
    let liveness_task = tokio::spawn(async move {
        liveness_monitor.start_periodic_check(check_interval).await;
    });

    // --- HTTP Server ---
    let app = create_axum_router(app_state);
    let listener = TcpListener::bind(&server_config.listen_addr).await?;
    info!(address = %server_config.listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    liveness_task.abort();
    info!("Server stopped.");
    Ok(())
}
