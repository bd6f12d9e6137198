//! Hub server configuration

use std::time::Duration;

use anyhow::{bail, Result};
use tandem_shared_config::{parse_env, CommonConfig, Environment, ServerConfig};

use crate::websocket::{DEFAULT_FRESHNESS_WINDOW, DEFAULT_MAILBOX_CAPACITY, DEFAULT_QUEUE_CAPACITY};

/// Hub configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Outbound queue capacity per connection (default: 256)
    pub queue_capacity: usize,

    /// Hub mailbox capacity (default: 1024)
    pub mailbox_capacity: usize,

    /// Maximum message age that is still forwarded (default: 5s)
    pub freshness_window: Duration,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// - `HUB_QUEUE_CAPACITY`: pending frames per connection before eviction
    /// - `HUB_MAILBOX_CAPACITY`: commands waiting for the hub loop
    /// - `SYNC_FRESHNESS_SECS`: freshness window in seconds
    ///
    /// Listener settings (`HOST`, `PORT`, `CORS_ORIGINS`) and `ENVIRONMENT`
    /// come from the shared configuration.
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        let queue_capacity = parse_env("HUB_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        let mailbox_capacity = parse_env("HUB_MAILBOX_CAPACITY", DEFAULT_MAILBOX_CAPACITY)?;
        let freshness_secs = parse_env("SYNC_FRESHNESS_SECS", DEFAULT_FRESHNESS_WINDOW.as_secs())?;

        Self::validate_capacity("HUB_QUEUE_CAPACITY", queue_capacity)?;
        Self::validate_capacity("HUB_MAILBOX_CAPACITY", mailbox_capacity)?;

        Ok(Self {
            common,
            queue_capacity,
            mailbox_capacity,
            freshness_window: Duration::from_secs(freshness_secs),
        })
    }

    fn validate_capacity(name: &str, value: usize) -> Result<()> {
        if value == 0 {
            bail!("{} must be at least 1", name);
        }
        Ok(())
    }

    /// Get listener configuration
    pub fn server(&self) -> &ServerConfig {
        &self.common.server
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            common: CommonConfig {
                server: ServerConfig::default(),
                environment: Environment::Development,
                log_level: "info".to_string(),
            },
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }
}
