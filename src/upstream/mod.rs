// Creature server collaborators: name lookups and the live event channel

mod http;
mod websocket;

pub use http::HttpNameLookup;
pub use websocket::run_event_stream;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Name lookups against the creature server.
///
/// Single-name lookups return `None` on any failure; callers fall back to ids.
#[async_trait]
pub trait NameLookup: Send + Sync {
    async fn fetch_creature_name(&self, creature_id: &str) -> Option<String>;

    async fn fetch_animation_name(&self, animation_id: &str) -> Option<String>;

    /// id → name for every stored animation
    async fn list_animation_names(&self) -> Result<HashMap<String, String>>;

    /// id → name for ad-hoc (generated) animations
    async fn list_ad_hoc_animation_names(&self) -> Result<HashMap<String, String>>;
}
