//! Configuration handling for the telemetry ingester.
//!
//! Settings come from a YAML file with environment-variable overrides on
//! top; command-line flags beat both. A missing or unparsable file falls
//! back to defaults so the binary can run against a local broker with no
//! setup.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use telemetry_ingest::{ConsumerSettings, RetentionSettings};
use telemetry_wire::DEFAULT_CHANNEL_KEY;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Broker subscription settings.
    pub mqtt: MqttConfig,
    /// Retention sweep settings.
    pub retention: RetentionConfig,
}

/// Broker subscription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional broker credentials.
    pub username: Option<String>,
    /// Optional broker credentials.
    pub password: Option<String>,
    /// Topic patterns to subscribe to.
    pub topics: Vec<String>,
    /// Default-channel pre-shared key, base64-encoded 16 bytes.
    pub channel_key: String,
    /// Origin addresses dropped at the consumer.
    pub reject_nodes: Vec<u32>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        let defaults = ConsumerSettings::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            username: None,
            password: None,
            topics: defaults.topics,
            channel_key: base64::engine::general_purpose::STANDARD.encode(DEFAULT_CHANNEL_KEY),
            reject_nodes: defaults.reject_nodes,
        }
    }
}

/// Retention sweep settings, humantime-formatted durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How often the sweep runs, e.g. `1h`.
    pub interval: String,
    /// Rows older than this are deleted, e.g. `14d`.
    pub max_age: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: "1h".to_string(),
            max_age: "14d".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from file, then apply environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<TelemetryConfig>(&content) {
                Ok(parsed) => {
                    config = parsed;
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(err) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path.as_ref(),
                        err
                    );
                }
            }
        } else {
            warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            );
        }

        config.apply_environment_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_environment_overrides(&mut self) {
        if let Ok(host) = std::env::var("TELEMETRY_MQTT_HOST") {
            self.mqtt.host = host;
            info!("MQTT host overridden by environment: {}", self.mqtt.host);
        }
        if let Ok(port) = std::env::var("TELEMETRY_MQTT_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.mqtt.port = port;
                info!("MQTT port overridden by environment: {}", port);
            }
        }
        if let Ok(username) = std::env::var("TELEMETRY_MQTT_USERNAME") {
            self.mqtt.username = Some(username);
            info!("MQTT username overridden by environment");
        }
        if let Ok(password) = std::env::var("TELEMETRY_MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
            info!("MQTT password overridden by environment");
        }
        if let Ok(key) = std::env::var("TELEMETRY_CHANNEL_KEY") {
            self.mqtt.channel_key = key;
            info!("Channel key overridden by environment");
        }
    }

    /// Build the consumer settings, decoding the channel key.
    pub fn consumer_settings(&self) -> Result<ConsumerSettings> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.mqtt.channel_key)
            .context("channel_key is not valid base64")?;
        let channel_key: [u8; 16] = key_bytes
            .try_into()
            .map_err(|_| anyhow!("channel_key must decode to exactly 16 bytes"))?;

        Ok(ConsumerSettings {
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            username: self.mqtt.username.clone(),
            password: self.mqtt.password.clone(),
            topics: self.mqtt.topics.clone(),
            reject_nodes: self.mqtt.reject_nodes.clone(),
            channel_key,
        })
    }

    /// Build the retention settings, parsing the duration strings.
    pub fn retention_settings(&self) -> Result<RetentionSettings> {
        Ok(RetentionSettings {
            interval: humantime::parse_duration(&self.retention.interval)
                .context("invalid retention.interval")?,
            max_age: humantime::parse_duration(&self.retention.max_age)
                .context("invalid retention.max_age")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topics, vec!["msh/#".to_string()]);
        assert_eq!(config.mqtt.reject_nodes, vec![2144342101]);

        let settings = config.consumer_settings().unwrap();
        assert_eq!(settings.channel_key, DEFAULT_CHANNEL_KEY);
        let retention = config.retention_settings().unwrap();
        assert_eq!(retention.interval.as_secs(), 3600);
        assert_eq!(retention.max_age.as_secs(), 14 * 24 * 3600);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
mqtt:
  host: broker.example.net
  port: 8883
  username: reader
  password: hunter2
  topics:
    - msh/US/#
    - msh/EU/#
  reject_nodes: [123, 456]

retention:
  interval: 30m
  max_age: 7d
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = TelemetryConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.mqtt.host, "broker.example.net");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("reader"));
        assert_eq!(config.mqtt.topics.len(), 2);
        assert_eq!(config.mqtt.reject_nodes, vec![123, 456]);
        // Unset channel key falls back to the well-known default.
        let settings = config.consumer_settings().unwrap();
        assert_eq!(settings.channel_key, DEFAULT_CHANNEL_KEY);

        let retention = config.retention_settings().unwrap();
        assert_eq!(retention.interval.as_secs(), 1800);
        assert_eq!(retention.max_age.as_secs(), 7 * 24 * 3600);
    }

    #[test]
    fn test_bad_channel_key_rejected() {
        let mut config = TelemetryConfig::default();
        config.mqtt.channel_key = "not base64!!".to_string();
        assert!(config.consumer_settings().is_err());

        config.mqtt.channel_key =
            base64::engine::general_purpose::STANDARD.encode([0u8; 8]);
        assert!(config.consumer_settings().is_err());
    }
}
