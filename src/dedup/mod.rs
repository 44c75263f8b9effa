// Per-topic last-value cache suppressing redundant publishes

mod value;

pub use value::FieldValue;

use dashmap::DashMap;

/// Remembers the last payload successfully handed to the broker per topic.
///
/// In-memory only; a restart republishes everything once.
pub struct PublishDeduplicator {
    last_published: DashMap<String, String>,
}

impl PublishDeduplicator {
    pub fn new() -> Self {
        Self {
            last_published: DashMap::new(),
        }
    }

    /// True when `value` differs from what was last recorded for `topic`, or
    /// nothing has been recorded yet.
    pub fn should_publish(&self, topic: &str, value: &str) -> bool {
        match self.last_published.get(topic) {
            Some(last) => last.value() != value,
            None => true,
        }
    }

    /// Record a publish. Call only after the connector accepted the write.
    pub fn record_published(&self, topic: &str, value: &str) {
        self.last_published
            .insert(topic.to_string(), value.to_string());
    }

    /// Last recorded payload for `topic`
    pub fn last_value(&self, topic: &str) -> Option<String> {
        self.last_published.get(topic).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.last_published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_published.is_empty()
    }
}

impl Default for PublishDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
