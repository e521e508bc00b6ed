//! Broker configuration file
//!
//! TOML-based configuration with sensible defaults; a missing file or an
//! empty one just works. CLI flags override file values.
//!
//! # Example
//!
//! ```toml
//! [listen]
//! address = "0.0.0.0"
//! port = 5480
//!
//! [database]
//! capacity = 65536
//!
//! [log]
//! level = "info"
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use pond_broker::BrokerConfig;

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Listen socket settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenConfig {
    /// Bind address
    pub address: String,
    /// Listen port
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        let defaults = BrokerConfig::default();
        Self {
            address: defaults.address,
            port: defaults.port,
        }
    }
}

/// Record store settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Maximum records held in memory
    pub capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            capacity: BrokerConfig::default().capacity,
        }
    }
}

/// Per-connection tuning
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Outbound buffer high-water mark in bytes
    pub high_water: usize,
    /// Heartbeat interval in seconds (0 disables)
    pub heartbeat_interval_secs: u64,
    /// Maximum concurrent queries per connection
    pub max_queries: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let defaults = BrokerConfig::default();
        Self {
            high_water: defaults.high_water,
            heartbeat_interval_secs: defaults.heartbeat_interval_secs,
            max_queries: defaults.max_queries_per_connection,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: LogLevel,
}

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Listen socket settings
    pub listen: ListenConfig,

    /// Record store settings
    pub database: DatabaseConfig,

    /// Per-connection tuning
    pub connection: ConnectionConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Translate into the broker's runtime configuration
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            address: self.listen.address.clone(),
            port: self.listen.port,
            capacity: self.database.capacity,
            high_water: self.connection.high_water,
            heartbeat_interval_secs: self.connection.heartbeat_interval_secs,
            max_queries_per_connection: self.connection.max_queries,
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
