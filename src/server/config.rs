use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// An active agent silent for longer than this is marked offline.
    #[serde(default = "default_offline_after_secs")]
    pub agent_offline_after_secs: u64,

    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_check_interval_secs: u64,

    #[serde(default = "default_command_poll_limit")]
    pub command_poll_limit: u64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    agent_offline_after_secs: Option<u64>,
    liveness_check_interval_secs: Option<u64>,
    command_poll_limit: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_offline_after_secs() -> u64 {
    300
}

fn default_liveness_interval_secs() -> u64 {
    60
}

fn default_command_poll_limit() -> u64 {
    50
}

impl PartialServerConfig {
    fn from_file(config_path: Option<&str>) -> Result<Self, String> {
        let Some(path_str) = config_path else {
            return Ok(Self::default());
        };
        let path = Path::new(path_str);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
    }

    /// Environment wins over file.
    fn merge(self, file: PartialServerConfig) -> Result<ServerConfig, String> {
        Ok(ServerConfig {
            database_url: self
                .database_url
                .or(file.database_url)
                .ok_or("DATABASE_URL is required")?,
            jwt_secret: self
                .jwt_secret
                .or(file.jwt_secret)
                .ok_or("JWT_SECRET is required")?,
            listen_addr: self
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: self.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            agent_offline_after_secs: self
                .agent_offline_after_secs
                .or(file.agent_offline_after_secs)
                .unwrap_or_else(default_offline_after_secs),
            liveness_check_interval_secs: self
                .liveness_check_interval_secs
                .or(file.liveness_check_interval_secs)
                .unwrap_or_else(default_liveness_interval_secs),
            command_poll_limit: self
                .command_poll_limit
                .or(file.command_poll_limit)
                .unwrap_or_else(default_command_poll_limit),
        })
    }
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        let file_config = PartialServerConfig::from_file(config_path)?;
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        env_config.merge(file_config)
    }

    /// Minimal config for tests and embedded use.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            listen_addr: default_listen_addr(),
            log_dir: default_log_dir(),
            agent_offline_after_secs: default_offline_after_secs(),
            liveness_check_interval_secs: default_liveness_interval_secs(),
            command_poll_limit: default_command_poll_limit(),
        }
    }
}
