//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::ranking::{IdentityPolicy, LimitRange};
use crate::storage::sqlite::DEFAULT_BUSY_TIMEOUT_MS;

/// Environment variable holding the database connection string.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable holding the shared admin secret.
pub const ADMIN_TOKEN_ENV: &str = "ADMIN_TOKEN";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string, e.g. `sqlite://./data/leaderboard.db` or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// How long a statement waits on a locked database (ms)
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_url() -> String {
    "sqlite://./data/leaderboard.db".to_string()
}

fn default_busy_timeout() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// Ranking view configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Identity used to dedupe the global view: "name" or "name_and_class"
    #[serde(default)]
    pub global_identity: IdentityPolicy,

    #[serde(default = "default_global_limit")]
    pub global_limit: LimitRange,

    #[serde(default = "default_class_limit")]
    pub class_limit: LimitRange,
}

fn default_global_limit() -> LimitRange {
    LimitRange::new(25, 500)
}

fn default_class_limit() -> LimitRange {
    LimitRange::new(5, 200)
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            global_identity: IdentityPolicy::default(),
            global_limit: default_global_limit(),
            class_limit: default_class_limit(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shared secret for the admin API. Unset or blank disables it.
    #[serde(default)]
    pub admin_token: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub ranking: RankingConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            admin_token: None,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists (defaults otherwise), then apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_overrides(
            std::env::var(DATABASE_URL_ENV).ok(),
            std::env::var(ADMIN_TOKEN_ENV).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Override the database url and admin token when values are given.
    pub fn apply_overrides(&mut self, database_url: Option<String>, admin_token: Option<String>) {
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.database.url = url;
        }
        if let Some(token) = admin_token {
            self.admin_token = Some(token);
        }
    }

    /// The configured admin secret, trimmed; `None` when unset or blank.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Database url must not be empty".to_string(),
            ));
        }

        for (label, range) in [
            ("global_limit", &self.ranking.global_limit),
            ("class_limit", &self.ranking.class_limit),
        ] {
            if range.max < 1 || range.default < 1 || range.default > range.max {
                return Err(ConfigError::ValidationError(format!(
                    "ranking.{label} needs 1 <= default <= max"
                )));
            }
        }

        Ok(())
    }
}
