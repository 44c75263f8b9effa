//! Downstream actions the agent dispatches for an admitted trigger.
//!
//! Two steps run in order: generate a line of speech, then ask the creature
//! server to turn it into an ad-hoc speech animation. Either step failing is a
//! [`DownstreamActionError`] and leaves the area's cooldown untouched.

use crate::config::OpenAiConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum DownstreamActionError {
    #[error("response generation failed: {0}")]
    Respond(String),
    #[error("speech animation request failed: {0}")]
    Dispatch(String),
    #[error("{0} returned an empty result")]
    Empty(&'static str),
}

/// Generates what the creature says.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, prompt: &str) -> Result<String, DownstreamActionError>;
}

/// Turns text into a spoken animation on a creature. Returns the job id.
#[async_trait]
pub trait SpeechDispatcher: Send + Sync {
    async fn create_ad_hoc_speech_animation(
        &self,
        creature_id: &str,
        text: &str,
        resume_playlist: bool,
    ) -> Result<String, DownstreamActionError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`Responder`] backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiResponder {
    config: OpenAiConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiResponder {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api_key = config
            .effective_api_key()
            .context("OpenAI API key missing (set openai.api_key or OPENAI_API_KEY)")?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            api_key,
            http_client,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            anyhow::bail!("Chat completion failed with status {}: {}", status, body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn respond(&self, prompt: &str) -> Result<String, DownstreamActionError> {
        let text = self
            .complete(prompt)
            .await
            .map_err(|e| DownstreamActionError::Respond(format!("{:#}", e)))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DownstreamActionError::Empty("chat completion"));
        }
        debug!(model = %self.config.model, chars = text.len(), "Generated response");
        Ok(text.to_string())
    }
}

#[derive(Serialize)]
struct AdHocSpeechRequest<'a> {
    creature_id: &'a str,
    text: &'a str,
    resume_playlist: bool,
}

#[derive(Deserialize)]
struct JobResponse {
    #[serde(default)]
    job_id: Option<String>,
}

/// [`SpeechDispatcher`] over the creature server REST API.
pub struct CreatureServerClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl CreatureServerClient {
    /// `base_url` like `http://creature-server:8000`
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn post_ad_hoc_speech(&self, request: &AdHocSpeechRequest<'_>) -> Result<Option<String>> {
        let url = format!("{}/api/v1/animation/ad-hoc-speech", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send ad-hoc speech request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            anyhow::bail!("Ad-hoc speech request failed with status {}: {}", status, body);
        }

        let job: JobResponse = response
            .json()
            .await
            .context("Failed to parse ad-hoc speech response")?;
        Ok(job.job_id)
    }
}

#[async_trait]
impl SpeechDispatcher for CreatureServerClient {
    async fn create_ad_hoc_speech_animation(
        &self,
        creature_id: &str,
        text: &str,
        resume_playlist: bool,
    ) -> Result<String, DownstreamActionError> {
        let request = AdHocSpeechRequest {
            creature_id,
            text,
            resume_playlist,
        };
        let job_id = self
            .post_ad_hoc_speech(&request)
            .await
            .map_err(|e| DownstreamActionError::Dispatch(format!("{:#}", e)))?
            .filter(|id| !id.trim().is_empty())
            .ok_or(DownstreamActionError::Empty("creature server"))?;

        info!(creature_id = %creature_id, job_id = %job_id, "Ad-hoc speech job queued");
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Boo!"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Boo!"));

        let empty: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.choices.is_empty());
    }

    #[test]
    fn test_ad_hoc_request_shape() {
        let request = AdHocSpeechRequest {
            creature_id: "c-1",
            text: "Hello there",
            resume_playlist: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["creature_id"], "c-1");
        assert_eq!(value["text"], "Hello there");
        assert_eq!(value["resume_playlist"], true);
    }

    #[test]
    fn test_job_response_tolerates_missing_id() {
        let job: JobResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert!(job.job_id.is_none());
    }

    #[test]
    fn test_responder_accepts_configured_key() {
        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            ..OpenAiConfig::default()
        };
        assert!(OpenAiResponder::new(config).is_ok());
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = CreatureServerClient::new("http://server:8000/").unwrap();
        assert_eq!(client.base_url, "http://server:8000");
    }
}
