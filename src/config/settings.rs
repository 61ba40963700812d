//! Configuration settings structure
//!
//! Defines the main settings structure and loading logic for the protocol engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Webhook server configuration
    pub server: ServerSettings,
    /// Session and CSRF configuration
    pub session: SessionSettings,
    /// Connection pool configuration
    pub pool: PoolSettings,
    /// Batch codec configuration
    pub batch: BatchSettings,
    /// Replay protection configuration
    pub replay: ReplaySettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Webhook server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Session state configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Lifetime of a cached session after its last update, in seconds
    pub timeout_secs: u64,
    /// Interval of the expired-session sweep, in seconds
    pub cleanup_interval_secs: u64,
}

/// Connection pool configuration
///
/// Immutable once the pool has built its clients; changes go through
/// [`crate::pool::ConnectionPoolManager::update_config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Keep connections alive between requests
    pub keep_alive: bool,
    /// TCP keep-alive probe interval in milliseconds
    pub keep_alive_msecs: u64,
    /// Ceiling on concurrently active connections per scheme
    pub max_sockets: usize,
    /// Maximum idle connections kept per host
    pub max_free_sockets: usize,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Idle connection timeout in milliseconds
    pub free_socket_timeout_ms: u64,
    /// Verify TLS certificates
    pub reject_unauthorized: bool,
}

/// Batch codec configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Operations per `$batch` request
    pub batch_size: usize,
    /// Wrap mutations in a changeset
    pub use_change_set: bool,
}

/// Replay protection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Nonce lifetime in seconds
    pub nonce_ttl_secs: u64,
    /// Hard ceiling on stored nonces
    pub max_entries: usize,
    /// Cleanup sweep interval in seconds
    pub cleanup_interval_secs: u64,
    /// Allowed clock skew for webhook timestamps in seconds
    pub timestamp_tolerance_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level
    pub level: String,
    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "::".to_string(),
            port: 5678,
            timeout_secs: 30,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            cleanup_interval_secs: 300,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            keep_alive: true,
            keep_alive_msecs: 1000,
            max_sockets: 50,
            max_free_sockets: 10,
            timeout_ms: 120_000,
            free_socket_timeout_ms: 30_000,
            reject_unauthorized: true,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            use_change_set: true,
        }
    }
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            nonce_ttl_secs: 300,
            max_entries: 10_000,
            cleanup_interval_secs: 60,
            timestamp_tolerance_secs: 300,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            session: SessionSettings::default(),
            pool: PoolSettings::default(),
            batch: BatchSettings::default(),
            replay: ReplaySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SessionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl PoolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn free_socket_timeout(&self) -> Duration {
        Duration::from_millis(self.free_socket_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_msecs)
    }
}

impl ReplaySettings {
    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_secs)
    }
}

impl Settings {
    /// Create new settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a TOML file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| crate::Error::config(format!("Invalid config file {:?}: {}", path, e)))
    }

    /// Load settings from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::default().merge_with_env()
    }

    /// Apply `SAP_ODATA_*` environment overrides on top of these settings
    pub fn merge_with_env(mut self) -> crate::Result<Self> {
        if let Ok(host) = std::env::var("SAP_ODATA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("SAP_ODATA_SERVER_PORT")? {
            self.server.port = port;
        }
        if let Some(timeout) = env_parse("SAP_ODATA_SESSION_TIMEOUT")? {
            self.session.timeout_secs = timeout;
        }
        if let Some(max_sockets) = env_parse("SAP_ODATA_POOL_MAX_SOCKETS")? {
            self.pool.max_sockets = max_sockets;
        }
        if let Some(max_free) = env_parse("SAP_ODATA_POOL_MAX_FREE_SOCKETS")? {
            self.pool.max_free_sockets = max_free;
        }
        if let Some(reject) = env_parse("SAP_ODATA_POOL_REJECT_UNAUTHORIZED")? {
            self.pool.reject_unauthorized = reject;
        }
        if let Some(batch_size) = env_parse("SAP_ODATA_BATCH_SIZE")? {
            self.batch.batch_size = batch_size;
        }
        if let Some(ttl) = env_parse("SAP_ODATA_NONCE_TTL")? {
            self.replay.nonce_ttl_secs = ttl;
        }
        if let Some(max_entries) = env_parse("SAP_ODATA_NONCE_MAX_ENTRIES")? {
            self.replay.max_entries = max_entries;
        }
        if let Ok(level) = std::env::var("SAP_ODATA_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Reject settings that would leave a component unusable
    pub fn validate(&self) -> crate::Result<()> {
        if self.pool.max_sockets == 0 {
            return Err(crate::Error::config("pool.max_sockets must be at least 1"));
        }
        if self.batch.batch_size == 0 {
            return Err(crate::Error::config("batch.batch_size must be at least 1"));
        }
        if self.replay.max_entries == 0 {
            return Err(crate::Error::config("replay.max_entries must be at least 1"));
        }
        if self.replay.cleanup_interval_secs == 0 {
            return Err(crate::Error::config(
                "replay.cleanup_interval_secs must be at least 1",
            ));
        }
        if self.session.timeout_secs == 0 {
            return Err(crate::Error::config("session.timeout_secs must be at least 1"));
        }
        if self.session.cleanup_interval_secs == 0 {
            return Err(crate::Error::config(
                "session.cleanup_interval_secs must be at least 1",
            ));
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> crate::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
