use super::NameLookup;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct CreatureDto {
    name: String,
}

#[derive(Deserialize, Default)]
struct AnimationMetadataDto {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct AnimationDto {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metadata: Option<AnimationMetadataDto>,
}

impl AnimationDto {
    fn display_name(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.title.clone()))
            .filter(|n| !n.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct AnimationListDto {
    #[serde(default)]
    items: Vec<AnimationDto>,
}

/// [`NameLookup`] over the creature server REST API.
#[derive(Clone)]
pub struct HttpNameLookup {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpNameLookup {
    /// `base_url` like `http://creature-server:8000`
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("{} returned status {}", url, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn list(&self, path: &str) -> Result<HashMap<String, String>> {
        let list: AnimationListDto = self.get_json(path).await?;
        Ok(list
            .items
            .iter()
            .filter_map(|a| a.display_name().map(|name| (a.id.clone(), name)))
            .collect())
    }
}

#[async_trait]
impl NameLookup for HttpNameLookup {
    async fn fetch_creature_name(&self, creature_id: &str) -> Option<String> {
        match self
            .get_json::<CreatureDto>(&format!("/api/v1/creature/{}", creature_id))
            .await
        {
            Ok(creature) => {
                debug!(creature_id = %creature_id, name = %creature.name, "Fetched creature name");
                Some(creature.name)
            }
            Err(e) => {
                warn!(creature_id = %creature_id, error = %e, "Creature name lookup failed");
                None
            }
        }
    }

    async fn fetch_animation_name(&self, animation_id: &str) -> Option<String> {
        match self
            .get_json::<AnimationDto>(&format!("/api/v1/animation/{}", animation_id))
            .await
        {
            Ok(animation) => animation.display_name(),
            Err(e) => {
                warn!(animation_id = %animation_id, error = %e, "Animation name lookup failed");
                None
            }
        }
    }

    async fn list_animation_names(&self) -> Result<HashMap<String, String>> {
        self.list("/api/v1/animation").await
    }

    async fn list_ad_hoc_animation_names(&self) -> Result<HashMap<String, String>> {
        self.list("/api/v1/animation/ad-hoc").await
    }
}
