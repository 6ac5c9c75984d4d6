//! Shared configuration types for the cache controller and coordinator
//!
//! These types are shared across crates. The configuration file itself is
//! loaded by the `pwa-cache` binary, which embeds them as the
//! `[controller]` and `[coordinator]` sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// Cache controller configuration
///
/// Everything a controller version needs to know: the bucket it owns, the
/// resources it must precache, and the URL patterns that pick a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Bucket name prefix, joined with `version`
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    /// Manually bumped version tag; changing it forces a new install
    #[serde(default = "default_version")]
    pub version: String,
    /// Absolute paths fetched unconditionally at install time
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,
    /// Path fragment identifying fingerprinted build assets
    #[serde(default = "default_asset_marker")]
    pub asset_marker: String,
    /// Exact paths of the application shell document
    #[serde(default = "default_shell_documents")]
    pub shell_documents: Vec<String>,
    /// In-app route prefixes served network-first
    #[serde(default = "default_shell_routes")]
    pub shell_routes: Vec<String>,
    /// Hosts whose requests are never intercepted
    #[serde(default = "default_passthrough_hosts")]
    pub passthrough_hosts: Vec<String>,
    /// Static files persisted by the catch-all strategy
    #[serde(default = "default_static_allowlist")]
    pub static_allowlist: Vec<String>,
    /// Activate right after install instead of waiting for a signal
    #[serde(default)]
    pub skip_waiting_on_install: bool,
}

impl ControllerConfig {
    /// Name of the bucket owned by this version
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CoreError> {
        pwa_storage::validate_bucket_name(&self.cache_name())
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;

        if self.version.is_empty() {
            return Err(CoreError::InvalidConfig("version must not be empty".to_string()));
        }

        if self.asset_marker.is_empty() {
            return Err(CoreError::InvalidConfig(
                "asset_marker must not be empty".to_string(),
            ));
        }

        for (field, paths) in [
            ("precache", &self.precache),
            ("shell_documents", &self.shell_documents),
            ("shell_routes", &self.shell_routes),
            ("static_allowlist", &self.static_allowlist),
        ] {
            if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
                return Err(CoreError::InvalidConfig(format!(
                    "{} entry must be an absolute path: {}",
                    field, bad
                )));
            }
        }

        if let Some(bad) = self
            .passthrough_hosts
            .iter()
            .find(|h| h.is_empty() || h.contains('/'))
        {
            return Err(CoreError::InvalidConfig(format!(
                "passthrough host must be a bare host name: {:?}",
                bad
            )));
        }

        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            precache: default_precache(),
            asset_marker: default_asset_marker(),
            shell_documents: default_shell_documents(),
            shell_routes: default_shell_routes(),
            passthrough_hosts: default_passthrough_hosts(),
            static_allowlist: default_static_allowlist(),
            skip_waiting_on_install: false,
        }
    }
}

/// Update coordinator timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Delay between detecting a waiting controller and the hand-off
    #[serde(default = "default_hand_off_delay_ms")]
    pub hand_off_delay_ms: u64,
    /// Delay between an update check and the second look for a waiting controller
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,
}

impl CoordinatorConfig {
    pub fn hand_off_delay(&self) -> Duration {
        Duration::from_millis(self.hand_off_delay_ms)
    }

    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            hand_off_delay_ms: default_hand_off_delay_ms(),
            recheck_delay_ms: default_recheck_delay_ms(),
        }
    }
}

fn default_cache_prefix() -> String {
    "san-camilo".to_string()
}

fn default_version() -> String {
    "v22".to_string()
}

fn default_precache() -> Vec<String> {
    vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
        "/logo-hospice.png".to_string(),
    ]
}

fn default_asset_marker() -> String {
    "/assets/".to_string()
}

fn default_shell_documents() -> Vec<String> {
    vec!["/".to_string(), "/index.html".to_string()]
}

fn default_shell_routes() -> Vec<String> {
    vec!["/huespedes".to_string(), "/partes".to_string()]
}

fn default_passthrough_hosts() -> Vec<String> {
    vec!["firebasestorage.googleapis.com".to_string()]
}

fn default_static_allowlist() -> Vec<String> {
    vec!["/manifest.json".to_string(), "/logo-hospice.png".to_string()]
}

fn default_hand_off_delay_ms() -> u64 {
    1000
}

fn default_recheck_delay_ms() -> u64 {
    3000
}
