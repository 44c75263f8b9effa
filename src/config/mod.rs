use crate::event::UnknownEventKind;
use crate::processor::{EventFilter, ProcessorConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub use crate::mqtt::MqttConfig;

/// Static settings that cannot be run with
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("mqtt.host must not be empty")]
    EmptyHost,
    #[error("{0} port must not be 0")]
    ZeroPort(&'static str),
    #[error("initial reconnect delay ({initial_ms}ms) exceeds max delay ({max_ms}ms)")]
    BackoffOrder { initial_ms: u64, max_ms: u64 },
    #[error(transparent)]
    UnknownEventKind(#[from] UnknownEventKind),
    #[error("trigger #{index} has an empty {field}")]
    IncompleteTrigger { index: usize, field: &'static str },
    #[error("{0}")]
    Invalid(String),
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub creature_server: CreatureServerConfig,
    #[serde(default)]
    pub bridge: PublishConfig,
}

/// Where the creature server lives
#[derive(Debug, Clone, Deserialize)]
pub struct CreatureServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
}

fn default_server_host() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    8000
}

impl Default for CreatureServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            use_tls: false,
        }
    }
}

impl CreatureServerConfig {
    /// REST base, e.g. `http://localhost:8000`
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Event websocket, e.g. `ws://localhost:8000/api/v1/websocket`
    pub fn ws_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}/api/v1/websocket", scheme, self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "creature_server.host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::ZeroPort("creature_server"));
        }
        Ok(())
    }
}

/// Topic layout and event selection
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Retain flag for non-identity fields
    #[serde(default)]
    pub retain: bool,
    /// Event types to publish; empty means all
    #[serde(default)]
    pub allow: Vec<String>,
    /// Event types never published; wins over `allow`
    #[serde(default)]
    pub deny: Vec<String>,
}

fn default_topic_prefix() -> String {
    crate::mqtt::DEFAULT_TOPIC_PREFIX.to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            retain: false,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

impl PublishConfig {
    pub fn processor_config(&self) -> Result<ProcessorConfig, ConfigError> {
        Ok(ProcessorConfig {
            topic_prefix: self.topic_prefix.clone(),
            retain: self.retain,
            filter: EventFilter::from_names(&self.allow[..], &self.deny[..])?,
        })
    }
}

/// Checks shared by every binary that talks to the broker.
pub fn validate_mqtt(mqtt: &MqttConfig) -> Result<(), ConfigError> {
    if mqtt.host.trim().is_empty() {
        return Err(ConfigError::EmptyHost);
    }
    if mqtt.port == 0 {
        return Err(ConfigError::ZeroPort("mqtt"));
    }
    if mqtt.initial_reconnect_delay_ms > mqtt.max_reconnect_delay_ms {
        return Err(ConfigError::BackoffOrder {
            initial_ms: mqtt.initial_reconnect_delay_ms,
            max_ms: mqtt.max_reconnect_delay_ms,
        });
    }
    Ok(())
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_mqtt(&self.mqtt)?;
        self.creature_server.validate()?;
        self.bridge.processor_config()?;
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig> {
    load_toml(path)
}

/// Read and parse any TOML config section tree
pub fn load_toml<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.max_reconnect_delay_ms, 30_000);
        assert_eq!(config.creature_server.base_url(), "http://localhost:8000");
        assert_eq!(config.bridge.topic_prefix, "creatures");
        assert!(!config.bridge.retain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [mqtt]
            host = "broker.local"
            port = 8883
            tls = true
            username = "bridge"
            keep_alive_secs = 15

            [creature_server]
            host = "server.local"
            port = 443
            use_tls = true

            [bridge]
            topic_prefix = "lab"
            retain = true
            deny = ["log", "server-counters"]
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.host, "broker.local");
        assert!(config.mqtt.tls);
        assert_eq!(config.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(config.mqtt.initial_reconnect_delay_ms, 1_000);
        assert_eq!(config.creature_server.base_url(), "https://server.local:443");
        assert_eq!(
            config.creature_server.ws_url(),
            "wss://server.local:443/api/v1/websocket"
        );
        assert_eq!(config.bridge.deny.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: BridgeConfig = toml::from_str("[bridge]\nretain = true\n").unwrap();
        assert!(config.bridge.retain);
        assert_eq!(config.bridge.topic_prefix, "creatures");
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let mut config = BridgeConfig::default();
        config.mqtt.host = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = BridgeConfig::default();
        config.mqtt.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPort("mqtt")));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = BridgeConfig::default();
        config.mqtt.initial_reconnect_delay_ms = 60_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::BackoffOrder {
                initial_ms: 60_000,
                max_ms: 30_000
            })
        );
    }

    #[test]
    fn test_validate_rejects_unknown_event_kind() {
        let mut config = BridgeConfig::default();
        config.bridge.allow = vec!["board-sensor-report".to_string(), "weather".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownEventKind(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nhost = \"10.0.0.5\"\n\n[bridge]\nallow = [\"log\"]").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mqtt.host, "10.0.0.5");
        assert_eq!(config.bridge.allow, vec!["log".to_string()]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/creature-mqtt.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
