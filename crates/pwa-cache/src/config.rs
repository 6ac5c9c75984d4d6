//! Configuration loading and management

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use pwa_core::{ControllerConfig, ControllerSource, CoordinatorConfig, CoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Cache controller version and routing
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Update hand-off timing
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public origin of the application; relative request targets resolve here
    #[serde(default = "default_app_origin")]
    pub app_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            app_origin: default_app_origin(),
        }
    }
}

/// Where the application itself is served from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default)]
    pub skip_tls_verify: bool,
    /// Overall request timeout; unset uses the HTTP client default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            skip_tls_verify: false,
            timeout_secs: None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "local" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub local: LocalStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local: LocalStorageConfig::default(),
        }
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_app_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:4173".to_string()
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_local_path() -> String {
    "./data/cache".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Check everything that can be checked before startup
    pub fn validate(&self) -> Result<()> {
        self.app_origin()?;
        self.upstream_url()?;
        self.controller
            .validate()
            .with_context(|| "Invalid [controller] section")?;

        match self.storage.backend.as_str() {
            "local" | "memory" => {}
            other => anyhow::bail!("Unknown storage backend: {}", other),
        }

        Ok(())
    }

    pub fn app_origin(&self) -> Result<Url> {
        Url::parse(&self.server.app_origin)
            .with_context(|| format!("Invalid server.app_origin: {}", self.server.app_origin))
    }

    pub fn upstream_url(&self) -> Result<Url> {
        Url::parse(&self.upstream.url)
            .with_context(|| format!("Invalid upstream.url: {}", self.upstream.url))
    }
}

/// Thread-safe configuration manager for runtime reloads
///
/// Also the source of controller versions: every update check re-reads the
/// file, so bumping `controller.version` and triggering an update rolls out
/// a new controller without a restart.
#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: Arc<RwLock<String>>,
}

impl ConfigManager {
    /// Create a new config manager
    pub fn new(config: Config, path: String) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path: Arc::new(RwLock::new(path)),
        }
    }

    /// Get the config file path
    pub fn get_path(&self) -> String {
        self.path.read().clone()
    }

    /// Reload configuration from file without blocking the runtime
    pub async fn reload_async(&self) -> Result<()> {
        let path = self.get_path();

        let new_config = tokio::task::spawn_blocking(move || Config::load(&path))
            .await
            .map_err(|e| anyhow::anyhow!("Task join error: {}", e))??;
        new_config.validate()?;

        {
            let mut config = self.config.write();
            *config = new_config;
        }

        info!("Configuration reloaded from {}", self.get_path());
        Ok(())
    }
}

#[async_trait]
impl ControllerSource for ConfigManager {
    async fn current(&self) -> Result<ControllerConfig, CoreError> {
        self.reload_async()
            .await
            .map_err(|e| CoreError::InvalidConfig(format!("{:#}", e)))?;
        Ok(self.config.read().controller.clone())
    }
}
