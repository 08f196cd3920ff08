//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::validation::{validate_csv_separator, validate_storage_key};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: None,
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5052
}

/// Database configuration (SQLite record store backend)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://data/fleet-history.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console, file or both)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/fleet-history")
}

fn default_log_prefix() -> String {
    "fleet-history".to_string()
}

fn default_log_rotation() -> bool {
    true
}

/// Where the history document is kept
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Upper bound accepted for `history.retention_days` (100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// History log settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Key under which the whole log is stored
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default)]
    pub backend: StorageBackend,
    /// Maximum serialized size accepted by the store, in bytes
    #[serde(default)]
    pub quota_bytes: Option<usize>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_user")]
    pub default_user: String,
    #[serde(default = "default_csv_separator")]
    pub csv_separator: String,
    /// Buffered events per slow subscriber before it starts lagging
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            backend: StorageBackend::default(),
            quota_bytes: None,
            max_entries: default_max_entries(),
            retention_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_user: default_user(),
            csv_separator: default_csv_separator(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl HistoryConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// CSV separator as a single character
    pub fn separator(&self) -> char {
        self.csv_separator.chars().next().unwrap_or(';')
    }
}

fn default_storage_key() -> String {
    "historiqueApp".to_string()
}

fn default_max_entries() -> usize {
    5000
}

fn default_retention_days() -> u32 {
    365
}

fn default_cleanup_interval() -> u64 {
    24 * 60 * 60
}

fn default_page_size() -> usize {
    50
}

fn default_max_page_size() -> usize {
    100
}

fn default_user() -> String {
    crate::models::DEFAULT_USER.to_string()
}

fn default_csv_separator() -> String {
    ";".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables (prefixed with FLEET_HISTORY_)
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("FLEET_HISTORY_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => Self::from_file(path)?,
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Read and parse a YAML configuration file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        eprintln!("[CONFIG] Loading configuration from: {:?}", path);
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/fleet-history/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("fleet-history/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply overrides read through `var`
    fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(host) = var("FLEET_HISTORY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("FLEET_HISTORY_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Database overrides
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }

        // Logging overrides
        if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = var("FLEET_HISTORY_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Some(target) = var("FLEET_HISTORY_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "file" => LogTarget::File,
                "both" => LogTarget::Both,
                _ => LogTarget::Console,
            };
        }
        if let Some(dir) = var("FLEET_HISTORY_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }

        // History overrides
        if let Some(n) = var("FLEET_HISTORY_MAX_ENTRIES").and_then(|v| v.parse().ok()) {
            self.history.max_entries = n;
        }
        if let Some(days) = var("FLEET_HISTORY_RETENTION_DAYS").and_then(|v| v.parse().ok()) {
            self.history.retention_days = days;
        }
        if let Some(backend) = var("FLEET_HISTORY_BACKEND") {
            self.history.backend = match backend.to_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                _ => StorageBackend::Sqlite,
            };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.history.backend == StorageBackend::Sqlite && self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty with the sqlite backend");
        }

        let history = &self.history;
        if !validate_storage_key(&history.storage_key) {
            anyhow::bail!("Invalid history storage key: {:?}", history.storage_key);
        }
        if history.max_entries == 0 {
            anyhow::bail!("history.max_entries must be at least 1");
        }
        if history.retention_days == 0 || history.retention_days > MAX_RETENTION_DAYS {
            anyhow::bail!(
                "history.retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            );
        }
        if history.cleanup_interval_secs == 0 {
            anyhow::bail!("history.cleanup_interval_secs must be at least 1");
        }
        if history.max_page_size == 0 {
            anyhow::bail!("history.max_page_size must be at least 1");
        }
        if history.default_page_size == 0 || history.default_page_size > history.max_page_size {
            anyhow::bail!(
                "history.default_page_size must be between 1 and max_page_size ({})",
                history.max_page_size
            );
        }
        if history.default_user.trim().is_empty() {
            anyhow::bail!("history.default_user cannot be empty");
        }
        if !validate_csv_separator(&history.csv_separator) {
            anyhow::bail!(
                "history.csv_separator must be a single character other than a quote or newline"
            );
        }
        if history.event_channel_capacity == 0 {
            anyhow::bail!("history.event_channel_capacity must be at least 1");
        }

        Ok(())
    }

    /// Create a default configuration file
    pub fn create_default_config(path: &PathBuf) -> Result<()> {
        let config = AppConfig::default();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_norway::to_string(&config)?;
        std::fs::write(path, yaml)?;

        Ok(())
    }
}
