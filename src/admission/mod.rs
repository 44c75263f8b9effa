// Timestamp-ordered admission with retained bootstrap and per-area cooldown

mod timestamp;

pub use timestamp::{normalize_timestamp, parse_timestamp};

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
mod tests;

/// Ordering state for one topic.
///
/// `no-data` is the absence of a record; `has_seen_live` flips to true on the
/// first admitted message and never back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventRecord {
    pub last_seen_timestamp: Option<f64>,
    pub has_seen_live: bool,
}

/// Outcome of [`EventAdmissionController::admit`]
#[derive(Clone, Debug, PartialEq)]
pub enum Admission {
    /// Ordered after everything seen so far; act on it
    Admitted { timestamp: f64 },
    /// Retained replay before any live traffic; kept as the ordering baseline
    Baseline { timestamp: f64 },
    /// At or before the last seen timestamp
    Stale { timestamp: f64, last_seen: f64 },
    /// No timestamp to order by
    Unorderable,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Decides which trigger messages are acted on.
///
/// Per-topic records order messages by their payload timestamp. Per-area
/// records throttle successful actions. Both tables are in-memory only.
pub struct EventAdmissionController {
    topics: DashMap<String, EventRecord>,
    areas: DashMap<String, Instant>,
}

impl EventAdmissionController {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            areas: DashMap::new(),
        }
    }

    /// Accept `timestamp` for `topic` if it is strictly newer than anything
    /// seen there; records it and marks the topic live.
    pub fn should_process(&self, topic: &str, timestamp: Option<f64>) -> bool {
        let Some(timestamp) = timestamp.filter(|ts| ts.is_finite()) else {
            debug!(topic = %topic, "Rejecting message without orderable timestamp");
            return false;
        };

        let mut record = self.topics.entry(topic.to_string()).or_default();
        if let Some(last_seen) = record.last_seen_timestamp {
            if timestamp <= last_seen {
                debug!(
                    topic = %topic,
                    timestamp = timestamp,
                    last_seen = last_seen,
                    "Rejecting stale or duplicate message"
                );
                return false;
            }
        }

        record.last_seen_timestamp = Some(timestamp);
        record.has_seen_live = true;
        true
    }

    /// Record a retained message's timestamp as the ordering baseline.
    ///
    /// No effect once the topic is live. Never moves the baseline backwards.
    pub fn update_initial_timestamp(&self, topic: &str, timestamp: f64) {
        if !timestamp.is_finite() {
            return;
        }
        let mut record = self.topics.entry(topic.to_string()).or_default();
        if record.has_seen_live {
            return;
        }
        let baseline = match record.last_seen_timestamp {
            Some(last_seen) => last_seen.max(timestamp),
            None => timestamp,
        };
        record.last_seen_timestamp = Some(baseline);
        debug!(topic = %topic, baseline = baseline, "Recorded retained baseline");
    }

    /// Classify one delivered message and update ordering state.
    ///
    /// Retained messages arriving before the topic went live only set the
    /// baseline. Everything else goes through [`Self::should_process`].
    pub fn admit(&self, topic: &str, timestamp: Option<f64>, retained: bool) -> Admission {
        let Some(ts) = timestamp.filter(|ts| ts.is_finite()) else {
            return Admission::Unorderable;
        };

        if retained && !self.has_seen_live(topic) {
            self.update_initial_timestamp(topic, ts);
            return Admission::Baseline { timestamp: ts };
        }

        if self.should_process(topic, Some(ts)) {
            Admission::Admitted { timestamp: ts }
        } else {
            Admission::Stale {
                timestamp: ts,
                last_seen: self.last_seen_timestamp(topic).unwrap_or(ts),
            }
        }
    }

    pub fn has_seen_live(&self, topic: &str) -> bool {
        self.topics
            .get(topic)
            .map(|r| r.has_seen_live)
            .unwrap_or(false)
    }

    pub fn last_seen_timestamp(&self, topic: &str) -> Option<f64> {
        self.topics.get(topic).and_then(|r| r.last_seen_timestamp)
    }

    pub fn record(&self, topic: &str) -> Option<EventRecord> {
        self.topics.get(topic).map(|r| r.clone())
    }

    /// Start the cooldown for `area`. Call only after the action succeeded.
    pub fn mark_area_processed(&self, area: &str) {
        self.areas.insert(area.to_string(), Instant::now());
    }

    /// Seconds left before `area` may act again, or `None` when clear.
    ///
    /// A non-positive `cooldown_seconds` disables the window.
    pub fn cooldown_window(&self, area: &str, cooldown_seconds: f64) -> Option<f64> {
        if cooldown_seconds <= 0.0 {
            return None;
        }
        let last_processed = *self.areas.get(area)?;
        let elapsed = Instant::now()
            .saturating_duration_since(last_processed)
            .as_secs_f64();
        let remaining = cooldown_seconds - elapsed;
        (remaining > 0.0).then_some(remaining)
    }
}

impl Default for EventAdmissionController {
    fn default() -> Self {
        Self::new()
    }
}
