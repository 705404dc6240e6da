//! Configuration loading and persistence.
//!
//! Settings come from `config.json` in the widgetlink config directory, then
//! environment variables override individual fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_RETRY_MS, DEFAULT_SOCKET_NAME, ENV_CONFIG_DIR, ENV_LOG,
    ENV_LOG_FILE, ENV_SOCKET, MAX_CONNECT_RETRY_DELAY,
};

const CONFIG_FILE: &str = "config.json";

/// Configuration for a widgetlink client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Unix socket the widget host listens on.
    pub socket_path: PathBuf,
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Log file; logs go to stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Connection attempts before the session gives up.
    pub connect_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles per attempt.
    pub connect_retry_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: std::env::temp_dir().join(DEFAULT_SOCKET_NAME),
            log_filter: "info".to_string(),
            log_file: None,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_ms: DEFAULT_CONNECT_RETRY_MS,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `WIDGETLINK_CONFIG_DIR` overrides the platform config directory
    /// (macOS: ~/Library/Application Support/widgetlink).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("widgetlink"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_dir()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads `config.json` from `dir`; defaults when the file is missing.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", config_path.display()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (environment variable name → value).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(socket) = lookup(ENV_SOCKET) {
            self.socket_path = PathBuf::from(socket);
        }

        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }

        if let Some(log_file) = lookup(ENV_LOG_FILE) {
            self.log_file = (!log_file.is_empty()).then(|| PathBuf::from(log_file));
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?)
    }

    /// Writes `config.json` into `dir`, creating it if necessary.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Delay before retry number `attempt` (0-based), capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.connect_retry_ms.saturating_mul(factor))
            .min(MAX_CONNECT_RETRY_DELAY)
    }
}
