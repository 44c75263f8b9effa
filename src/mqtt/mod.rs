// MQTT connector: broker session, reconnect policy, topic construction

mod backoff;
mod client;
mod topic;

pub use backoff::ReconnectState;
pub use client::{ConnectionHealth, MqttConfig, MqttConnector};
pub use topic::{slug, topic_string, TopicBuilder, DEFAULT_TOPIC_PREFIX};

use async_trait::async_trait;

/// Transport-layer failures. Retryable, never fatal to the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("connector has been shut down")]
    Shutdown,
    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// A message delivered by the broker for one of our subscriptions.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Set when the broker replayed its stored value for the topic
    pub retained: bool,
}

impl IncomingMessage {
    /// Payload as UTF-8 text (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Pub/sub seam between the bridge logic and the broker.
///
/// All operations use at-least-once delivery. `publish` never queues: while the
/// broker session is down it returns [`TransportError::NotConnected`] at once.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Publish a UTF-8 payload.
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError>;

    /// Register interest in `topics`. Kept across reconnects.
    async fn subscribe(&self, topics: &[String]) -> Result<(), TransportError>;

    /// Stop the reconnect loop and drop the session. Safe to call repeatedly.
    async fn disconnect(&self);
}
