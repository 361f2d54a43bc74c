use crate::error::{DmsError, Result};
use crate::store::{BackingStore, MemoryStore, SqliteStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Service configuration, usually read from `dms.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// Retry policy for idempotent reads against the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before the given (1-based) retry.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("dms.db")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    50
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Read a YAML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        Config::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        if config.retry.max_attempts == 0 {
            return Err(DmsError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(config)
    }

    /// Apply `DMS_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(backend) = lookup("DMS_STORE_BACKEND") {
            self.store.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "sqlite" => StoreBackend::Sqlite,
                other => {
                    return Err(DmsError::Config(format!(
                        "DMS_STORE_BACKEND must be 'memory' or 'sqlite', got '{other}'"
                    )))
                }
            };
        }
        if let Some(path) = lookup("DMS_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(host) = lookup("DMS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DMS_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| DmsError::Config(format!("DMS_PORT is not a port number: '{port}'")))?;
        }
        Ok(())
    }

    /// Build the configured backing store as a shared handle.
    pub fn open_store(&self) -> Result<Arc<dyn BackingStore>> {
        match self.store.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::Sqlite => {
                log::info!("Opening SQLite store at {}", self.store.path.display());
                let store = SqliteStore::open(&self.store.path)
                    .map_err(|e| DmsError::Unavailable(e.to_string()))?;
                Ok(Arc::new(store))
            }
        }
    }
}
