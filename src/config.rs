//! # Configuration
//!
//! Connection limits, the channel table, loopback queue sizing and logging.
//!
//! ## Sources
//! - TOML via `from_file()` / `from_toml()`
//! - `NetworkConfig::default()` and `default_with_overrides()`
//! - Environment overrides via `from_env()` (`GAME_NETCORE_*`)
//!
//! ## Example
//! ```toml
//! [connection]
//! packet_size = 1200
//! max_connections = 64
//!
//! [[channels]]
//! qos = "reliable"
//!
//! [[channels]]
//! qos = "unreliable"
//! ```

use crate::error::{NetError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// Default packet capacity in bytes (a typical MTU-sized datagram)
pub const DEFAULT_PACKET_SIZE: usize = 1500;

/// Smallest packet that still holds a record header, a tag and some payload
pub const MIN_PACKET_SIZE: usize = 64;

/// Largest packet a u16 record length can describe
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Channel table; index in this list is the channel id
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub loopback: LoopbackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            channels: default_channels(),
            loopback: LoopbackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            qos: QosType::Reliable,
        },
        ChannelConfig {
            qos: QosType::Unreliable,
        },
    ]
}

impl NetworkConfig {
    /// Read and parse a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NetError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| NetError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `GAME_NETCORE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("GAME_NETCORE_PACKET_SIZE") {
            config.connection.packet_size = size.parse().map_err(|e| {
                NetError::ConfigError(format!("GAME_NETCORE_PACKET_SIZE: {e}"))
            })?;
        }

        if let Ok(max) = std::env::var("GAME_NETCORE_MAX_CONNECTIONS") {
            config.connection.max_connections = max.parse().map_err(|e| {
                NetError::ConfigError(format!("GAME_NETCORE_MAX_CONNECTIONS: {e}"))
            })?;
        }

        if let Ok(pool) = std::env::var("GAME_NETCORE_MESSAGE_POOL_SIZE") {
            config.loopback.message_pool_size = pool.parse().map_err(|e| {
                NetError::ConfigError(format!("GAME_NETCORE_MESSAGE_POOL_SIZE: {e}"))
            })?;
        }

        if let Ok(level) = std::env::var("GAME_NETCORE_LOG_LEVEL") {
            config.logging.log_level = level
                .parse()
                .map_err(|_| NetError::ConfigError(format!("Invalid log level: {level}")))?;
        }

        Ok(config)
    }

    /// Defaults with `mutator` applied, mostly for tests.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// The default configuration rendered as TOML.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NetError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| NetError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Reliability flag for a channel id, if the channel exists
    pub fn channel_is_reliable(&self, channel_id: u8) -> Option<bool> {
        self.channels
            .get(usize::from(channel_id))
            .map(|c| c.qos.is_reliable())
    }

    /// Validate the configuration. Empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.connection.validate());

        if self.channels.is_empty() {
            errors.push("At least one channel must be configured".to_string());
        } else if self.channels.len() > usize::from(u8::MAX) + 1 {
            errors.push(format!(
                "Too many channels: {} (maximum: 256)",
                self.channels.len()
            ));
        }

        errors.extend(self.loopback.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// `validate()` folded into a single `ConfigError`.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NetError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Per-connection limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Capacity of each channel's packet buffer, in bytes
    pub packet_size: usize,

    /// Maximum number of remote connections accepted by a server endpoint
    pub max_connections: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            max_connections: 1000,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.packet_size < MIN_PACKET_SIZE {
            errors.push(format!(
                "Packet size too small: {} (minimum: {MIN_PACKET_SIZE})",
                self.packet_size
            ));
        } else if self.packet_size > MAX_PACKET_SIZE {
            errors.push(format!(
                "Packet size too large: {} (maximum: {MAX_PACKET_SIZE})",
                self.packet_size
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > i32::MAX as usize {
            errors.push(format!(
                "Max connections exceeds the id space: {}",
                self.max_connections
            ));
        }

        errors
    }
}

/// Quality of service for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QosType {
    Reliable,
    ReliableSequenced,
    Unreliable,
    UnreliableSequenced,
}

impl QosType {
    pub fn is_reliable(self) -> bool {
        matches!(self, QosType::Reliable | QosType::ReliableSequenced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub qos: QosType,
}

/// Loopback queue settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoopbackConfig {
    /// Number of recycled payload buffers kept for reuse
    pub message_pool_size: usize,

    /// Initial capacity of each internal message queue
    pub queue_capacity: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            message_pool_size: 64,
            queue_capacity: 32,
        }
    }
}

impl LoopbackConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.message_pool_size > 65_536 {
            errors.push(format!(
                "Message pool too large: {} (maximum: 65536)",
                self.message_pool_size
            ));
        }

        if self.queue_capacity > 1_000_000 {
            errors.push(format!(
                "Queue capacity too large: {} (maximum: 1,000,000)",
                self.queue_capacity
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("game-netcore"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
