//! Configuration module for the gateway

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::DEFAULT_FREE_LIMIT;

/// Main application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub processing: ProcessingSettings,
    pub polling: PollingSettings,
    pub quota: QuotaSettings,
    pub database: DatabaseSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// External background-removal service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Base URL; `jobs` and `jobs/{id}` are resolved against it
    pub base_url: String,
    pub api_token: Option<String>,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
}

/// Status polling behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub max_polls: u32,
    pub max_transient_retries: u32,
}

/// Free-tier limits and cookie handling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub free_limit: u32,
    /// Mark anonymous cookies `Secure` (disable only for plain-http development)
    pub secure_cookies: bool,
}

/// Database configuration for PostgreSQL
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with CUTOUT_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // CUTOUT_PROCESSING__BASE_URL, CUTOUT_QUOTA__FREE_LIMIT, ...
            .add_source(
                Environment::with_prefix("CUTOUT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            );

        builder.build()?.try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ProcessingSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        ProcessingSettings {
            base_url: "http://localhost:5000/".to_string(),
            api_token: None,
            rate_limit_per_minute: 600,
            request_timeout_secs: 30,
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        PollingSettings {
            interval_ms: 1000,
            max_polls: 600,
            max_transient_retries: 3,
        }
    }
}

impl Default for QuotaSettings {
    fn default() -> Self {
        QuotaSettings {
            free_limit: DEFAULT_FREE_LIMIT,
            secure_cookies: true,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            url: String::new(),
            max_connections: Some(10),
        }
    }
}
