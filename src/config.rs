//! Configuration for prasar
//!
//! Loads configuration from TOML file. The broadcast interval is chosen by
//! the producer and transmitted to consumers in the handshake ack, so the
//! consumer section deliberately has no interval field of its own.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    pub logging: LoggingConfig,
}

/// Producer-side configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// UDP bind address for the admission socket
    ///
    /// Examples:
    /// - `0.0.0.0:5560` - Bind to all interfaces on port 5560
    /// - `127.0.0.1:5560` - Localhost only
    pub bind_address: String,

    /// Seconds between broadcast cycles; sent to consumers in the ack
    pub broadcast_interval_secs: f64,
}

/// Consumer-side configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Producer admission address, e.g. `192.168.68.101:5560`
    pub producer_address: String,

    /// Identity this consumer registers under. Convention-unique; at most
    /// 20 ASCII bytes survive the wire, and a later registration with the
    /// same identity supersedes this one.
    pub identity: String,

    /// Reconnect automatically after a liveness timeout. When false the
    /// timeout is surfaced to the caller as a fatal error.
    pub reconnect: bool,

    /// Seconds to wait for a handshake ack before retrying on a fresh socket
    pub handshake_timeout_secs: f64,

    /// Liveness timeout as a multiple of the negotiated broadcast interval,
    /// to tolerate jitter without waiting indefinitely
    pub liveness_multiplier: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output (stdout, stderr, or file path)
    pub output: String,
}

impl ConsumerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.handshake_timeout_secs)
    }
}

impl ProducerConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs_f64(self.broadcast_interval_secs)
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.producer.broadcast_interval_secs <= 0.0 {
            return Err(crate::error::Error::Config(
                "broadcast_interval_secs must be positive".to_string(),
            ));
        }
        if self.consumer.handshake_timeout_secs <= 0.0 {
            return Err(crate::error::Error::Config(
                "handshake_timeout_secs must be positive".to_string(),
            ));
        }
        if self.consumer.liveness_multiplier == 0 {
            return Err(crate::error::Error::Config(
                "liveness_multiplier must be at least 1".to_string(),
            ));
        }
        if self.consumer.identity.trim().is_empty() {
            return Err(crate::error::Error::Config(
                "consumer identity must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            producer: ProducerConfig {
                bind_address: "0.0.0.0:5560".to_string(),
                broadcast_interval_secs: 0.05,
            },
            consumer: ConsumerConfig {
                producer_address: "127.0.0.1:5560".to_string(),
                identity: "replica".to_string(),
                reconnect: true,
                handshake_timeout_secs: 2.0,
                liveness_multiplier: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                output: "stdout".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.producer.bind_address, "0.0.0.0:5560");
        assert_eq!(config.producer.broadcast_interval_secs, 0.05);
        assert!(config.consumer.reconnect);
        assert_eq!(config.consumer.liveness_multiplier, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[producer]"));
        assert!(toml_string.contains("[consumer]"));
        assert!(toml_string.contains("[logging]"));

        let parsed: AppConfig = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.producer.bind_address, config.producer.bind_address);
        assert_eq!(parsed.consumer.identity, config.consumer.identity);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[producer]
bind_address = "0.0.0.0:6000"
broadcast_interval_secs = 0.1

[consumer]
producer_address = "192.168.68.101:6000"
identity = "nav-replica"
reconnect = false
handshake_timeout_secs = 1.5
liveness_multiplier = 50

[logging]
level = "debug"
output = "stdout"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.producer.bind_address, "0.0.0.0:6000");
        assert_eq!(config.consumer.identity, "nav-replica");
        assert!(!config.consumer.reconnect);
        assert_eq!(config.consumer.liveness_multiplier, 50);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prasar.toml");

        let config = AppConfig::default();
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.producer.bind_address, config.producer.bind_address);
        assert_eq!(
            loaded.consumer.handshake_timeout_secs,
            config.consumer.handshake_timeout_secs
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.producer.broadcast_interval_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.consumer.liveness_multiplier = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.consumer.identity = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
