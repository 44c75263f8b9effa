use anyhow::Result;
use creature_mqtt::config::{load_toml, validate_mqtt, ConfigError, CreatureServerConfig};
use creature_mqtt::mqtt::MqttConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Complete agent configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub creature_server: CreatureServerConfig,
    /// `[[trigger]]` tables
    #[serde(default, rename = "trigger")]
    pub triggers: Vec<TriggerConfig>,
}

/// Chat completion settings
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Falls back to `OPENAI_API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    "You are an animatronic creature. Reply with one or two short spoken sentences.".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_model(),
            api_key: None,
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OpenAiConfig {
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// One MQTT topic the agent reacts to
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TriggerConfig {
    pub topic: String,
    /// Cooldown group; several topics may share one area
    pub area: String,
    pub creature_id: String,
    pub prompt: String,
    /// Zero or negative disables the cooldown
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
    #[serde(default = "default_resume_playlist")]
    pub resume_playlist: bool,
}

fn default_cooldown_seconds() -> f64 {
    30.0
}

fn default_resume_playlist() -> bool {
    true
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_mqtt(&self.mqtt)?;
        self.creature_server.validate()?;

        if self.openai.model.trim().is_empty() {
            return Err(ConfigError::Invalid("openai.model must not be empty".to_string()));
        }
        if self.triggers.is_empty() {
            return Err(ConfigError::Invalid("no [[trigger]] configured".to_string()));
        }

        let mut topics = HashSet::new();
        for (index, trigger) in self.triggers.iter().enumerate() {
            let required = [
                ("topic", &trigger.topic),
                ("area", &trigger.area),
                ("creature_id", &trigger.creature_id),
                ("prompt", &trigger.prompt),
            ];
            for (field, value) in required {
                if value.trim().is_empty() {
                    return Err(ConfigError::IncompleteTrigger { index, field });
                }
            }
            if !topics.insert(trigger.topic.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "topic '{}' is configured by more than one trigger",
                    trigger.topic
                )));
            }
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<AgentConfig> {
    load_toml(path)
}
