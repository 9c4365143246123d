//! Configuration file support for crmsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. Environment variables (prefixed with `CRMSYNC_`, e.g., `CRMSYNC_DATABASE_URL`)
//! 2. Local config file (./crmsync.toml)
//! 3. XDG config file (~/.config/crmsync/config.toml)
//! 4. Built-in defaults
//!
//! Multi-word keys like `base_url` do not map cleanly through the env-var
//! separator; set those in the config file. `CRMSYNC_CRM_TOKEN` and
//! `CRMSYNC_DATABASE_URL` both work from the environment.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/crmsync/crmsync.db"  # optional, this is the default
//!
//! [crm]
//! base_url = "https://example.amocrm.com/api/v4"
//! token = "..."             # or use CRMSYNC_CRM_TOKEN env var
//! page_size = 250
//! request_delay_ms = 200
//!
//! [rate]
//! max_requests_per_second = 7
//! adaptive = true
//!
//! [sync]
//! events_lookback_months = 6
//! messages_lookback_months = 12
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Remote CRM API configuration.
    pub crm: CrmConfig,
    /// Request-rate governor configuration.
    pub rate: RateConfig,
    /// Sync window tuning.
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL. Supports sqlite:// and postgres:// schemes.
    /// Defaults to `sqlite://~/.local/state/crmsync/crmsync.db` if not specified.
    pub url: Option<String>,
}

/// Remote CRM API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// API root, e.g. `https://example.amocrm.com/api/v4`.
    pub base_url: Option<String>,
    /// Bearer token. Can also be set via CRMSYNC_CRM_TOKEN.
    pub token: Option<String>,
    /// Page size for streamed endpoints; the remote caps this at 250.
    pub page_size: u32,
    /// Courtesy delay between successive pages, in milliseconds.
    pub request_delay_ms: u64,
    /// Per-request HTTP timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            page_size: 250,
            request_delay_ms: 200,
            timeout_secs: 30,
        }
    }
}

/// Request-rate governor configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Requests per second; the library clamps this to the remote's ceiling.
    pub max_requests_per_second: u32,
    /// Whether throttle responses grow an adaptive extra delay.
    pub adaptive: bool,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 7,
            adaptive: true,
        }
    }
}

/// Sync window tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How far back a first event sync reaches.
    pub events_lookback_months: u32,
    /// How far back a first message sync reaches.
    pub messages_lookback_months: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            events_lookback_months: 6,
            messages_lookback_months: 12,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "crmsync") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("crmsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./crmsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g. CRMSYNC_DATABASE_URL -> database.url, CRMSYNC_CRM_TOKEN -> crm.token
        builder = builder.add_source(
            Environment::with_prefix("CRMSYNC")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory
    /// path. `mode=rwc` creates the file on first use.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            let proj_dirs = ProjectDirs::from("", "", "crmsync")?;
            let state_dir = proj_dirs
                .state_dir()
                .map(PathBuf::from)
                .unwrap_or_else(|| proj_dirs.data_local_dir().to_path_buf());
            if let Err(e) = std::fs::create_dir_all(&state_dir) {
                tracing::warn!("Failed to create state directory: {}", e);
                return None;
            }
            let db_path = state_dir.join("crmsync.db");
            Some(format!("sqlite://{}?mode=rwc", db_path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible_without_any_sources() {
        let config = Config::default();
        assert_eq!(config.crm.page_size, 250);
        assert_eq!(config.rate.max_requests_per_second, 7);
        assert!(config.rate.adaptive);
        assert_eq!(config.sync.events_lookback_months, 6);
        assert_eq!(config.sync.messages_lookback_months, 12);
        assert!(config.crm.base_url.is_none());
    }
}
