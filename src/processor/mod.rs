// Fan-out of upstream events into MQTT topic writes

mod filter;

pub use filter::EventFilter;

use crate::dedup::{FieldValue, PublishDeduplicator};
use crate::event::*;
use crate::mqtt::{Connector, TopicBuilder};
use crate::resolver::{MissPolicy, NameFetch, Resolution, ResolverCache};
use crate::upstream::NameLookup;
use anyhow::{Context, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};


/// Processor settings
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub topic_prefix: String,
    /// Retain flag for non-identity fields
    pub retain: bool,
    pub filter: EventFilter,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            topic_prefix: crate::mqtt::DEFAULT_TOPIC_PREFIX.to_string(),
            retain: false,
            filter: EventFilter::default(),
        }
    }
}

/// Per-event publish counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub published: usize,
    /// Suppressed because the topic already holds this value
    pub unchanged: usize,
    pub failed: usize,
    /// Dropped by the type filter
    pub filtered: bool,
}

impl ProcessSummary {
    fn filtered() -> Self {
        Self {
            filtered: true,
            ..Self::default()
        }
    }
}

/// One pending topic write
struct FieldWrite {
    components: Vec<String>,
    value: FieldValue,
    retain: bool,
}

/// Collects the writes for one event under a common topic root
struct Writes {
    root: Vec<String>,
    retain: bool,
    writes: Vec<FieldWrite>,
}

impl Writes {
    fn new(root: &[&str], retain: bool) -> Self {
        Self {
            root: root.iter().map(|s| s.to_string()).collect(),
            retain,
            writes: Vec::new(),
        }
    }

    fn push_with(&mut self, path: &[&str], value: impl Into<FieldValue>, retain: bool) {
        let mut components = self.root.clone();
        components.extend(path.iter().map(|s| s.to_string()));
        self.writes.push(FieldWrite {
            components,
            value: value.into(),
            retain,
        });
    }

    fn field(&mut self, path: &[&str], value: impl Into<FieldValue>) {
        let retain = self.retain;
        self.push_with(path, value, retain);
    }

    fn optional(&mut self, path: &[&str], value: Option<impl Into<FieldValue>>) {
        if let Some(value) = value {
            self.field(path, value);
        }
    }

    /// Identity fields are always retained
    fn identity(&mut self, path: &[&str], value: impl Into<FieldValue>) {
        self.push_with(path, value, true);
    }
}

/// Maps typed upstream events to topic writes.
///
/// Each field goes through the de-duplicator and the connector on its own;
/// a failed write is logged and the remaining fields still go out.
pub struct EventProcessor {
    connector: Arc<dyn Connector>,
    lookup: Arc<dyn NameLookup>,
    topics: TopicBuilder,
    retain: bool,
    filter: EventFilter,
    dedup: PublishDeduplicator,
    creatures: ResolverCache,
    animations: ResolverCache,
    reloads: Mutex<JoinSet<()>>,
}

impl EventProcessor {
    pub fn new(
        connector: Arc<dyn Connector>,
        lookup: Arc<dyn NameLookup>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            connector,
            lookup,
            topics: TopicBuilder::new(&config.topic_prefix),
            retain: config.retain,
            filter: config.filter,
            dedup: PublishDeduplicator::new(),
            creatures: ResolverCache::new("creatures", MissPolicy::RawId),
            animations: ResolverCache::new("animations", MissPolicy::unknown()),
            reloads: Mutex::new(JoinSet::new()),
        }
    }

    pub fn creature_names(&self) -> &ResolverCache {
        &self.creatures
    }

    pub fn animation_names(&self) -> &ResolverCache {
        &self.animations
    }

    pub fn deduplicator(&self) -> &PublishDeduplicator {
        &self.dedup
    }

    fn lock_reloads(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.reloads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process events until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<ServerEvent>) {
        info!("Event processor started");
        while let Some(event) = events.recv().await {
            let summary = self.process(&event).await;
            debug!(
                kind = %event.kind(),
                published = summary.published,
                unchanged = summary.unchanged,
                failed = summary.failed,
                "Processed event"
            );
        }
        info!("Event channel closed; processor stopping");
    }

    /// Fan one event out to its topics.
    pub async fn process(&self, event: &ServerEvent) -> ProcessSummary {
        let kind = event.kind();
        if !self.filter.allows(kind) {
            debug!(kind = %kind, "Event type filtered");
            return ProcessSummary::filtered();
        }

        let writes = match event {
            ServerEvent::BoardSensorReport(report) => self.board_sensor_writes(report),
            ServerEvent::MotorSensorReport(report) => self.motor_sensor_writes(report),
            ServerEvent::EmergencyStop(stop) => {
                let mut w = Writes::new(&["emergency_stop"], self.retain);
                w.field(&["reason"], stop.reason.as_str());
                w.field(&["timestamp"], stop.timestamp);
                w
            }
            ServerEvent::Log(line) => {
                let mut w = Writes::new(&["logs"], self.retain);
                w.field(&["level"], line.level.as_str());
                w.field(&["message"], line.message.as_str());
                w.field(&["timestamp"], line.timestamp);
                w
            }
            ServerEvent::PlaylistStatus(status) => self.playlist_writes(status),
            ServerEvent::StatusLights(lights) => {
                let mut w = Writes::new(&["status_lights"], self.retain);
                w.field(&["running"], lights.running);
                w.field(&["dmx"], lights.dmx);
                w.field(&["streaming"], lights.streaming);
                w.field(&["animation_playing"], lights.animation_playing);
                w.field(&["timestamp"], lights.timestamp);
                w
            }
            ServerEvent::ServerCounters(counters) => {
                let mut w = Writes::new(&["server", "counters"], self.retain);
                for (name, value) in &counters.counters {
                    w.field(&[name.as_str()], *value);
                }
                w
            }
            ServerEvent::JobProgress(job) => {
                let mut w = Writes::new(&["jobs", job.job_id.as_str()], self.retain);
                w.field(&["job_type"], job.job_type.as_str());
                w.field(&["status"], job.status.as_str());
                w.field(&["progress"], job.progress);
                w.optional(&["details"], job.details.as_deref());
                w
            }
            ServerEvent::JobComplete(job) => {
                let mut w = Writes::new(&["jobs", job.job_id.as_str()], self.retain);
                w.field(&["job_type"], job.job_type.as_str());
                w.field(&["status"], job.status.as_str());
                w.field(&["progress"], 1.0);
                w.optional(&["details"], job.details.as_deref());
                w.optional(&["result"], job.result.as_deref());
                w
            }
            ServerEvent::IdleStateChanged(idle) => {
                let creature = self.resolve_creature(&idle.creature_id, None);
                let mut w = Writes::new(&[creature.key.as_str()], self.retain);
                self.creature_identity(&mut w, &idle.creature_id, &creature);
                w.field(&["idle", "enabled"], idle.idle_enabled);
                w.field(&["idle", "timestamp"], idle.timestamp);
                w
            }
            ServerEvent::CreatureActivity(activity) => self.activity_writes(activity),
            ServerEvent::CacheInvalidation(invalidation) => {
                if invalidation.cache_type.is_animation_scoped() {
                    self.reload_animation_names();
                }
                let mut w = Writes::new(&["cache_invalidation"], self.retain);
                w.field(&["cache_type"], invalidation.cache_type.as_str());
                w.field(&["timestamp"], invalidation.timestamp);
                w
            }
            ServerEvent::UpsertCreature(record) => {
                let creature = self.resolve_creature(&record.id, Some(&record.name));
                let mut w = Writes::new(&[creature.key.as_str()], self.retain);
                self.creature_identity(&mut w, &record.id, &creature);
                w
            }
        };

        self.publish_all(writes).await
    }

    fn creature_fetch(&self, creature_id: &str) -> NameFetch {
        let lookup = Arc::clone(&self.lookup);
        let creature_id = creature_id.to_string();
        async move { lookup.fetch_creature_name(&creature_id).await }.boxed()
    }

    fn animation_fetch(&self, animation_id: &str) -> NameFetch {
        let lookup = Arc::clone(&self.lookup);
        let animation_id = animation_id.to_string();
        async move { lookup.fetch_animation_name(&animation_id).await }.boxed()
    }

    fn resolve_creature(&self, creature_id: &str, preferred: Option<&str>) -> Resolution {
        self.creatures
            .resolve(creature_id, preferred, Some(self.creature_fetch(creature_id)))
    }

    fn creature_identity(&self, w: &mut Writes, creature_id: &str, creature: &Resolution) {
        w.identity(&["id"], creature_id);
        if let Some(name) = &creature.name {
            w.identity(&["name"], name.as_str());
        }
    }

    fn board_sensor_writes(&self, report: &BoardSensorReport) -> Writes {
        let creature = self.resolve_creature(&report.creature_id, report.creature_name.as_deref());
        let mut w = Writes::new(&[creature.key.as_str()], self.retain);
        self.creature_identity(&mut w, &report.creature_id, &creature);

        w.field(&["sensors", "board", "temperature_f"], report.board_temperature);
        w.field(&["sensors", "board", "timestamp"], report.timestamp);
        for power in &report.power_reports {
            let sensor = power.name.as_str();
            w.field(&["sensors", "board", "power", sensor, "voltage"], power.voltage);
            w.field(&["sensors", "board", "power", sensor, "current"], power.current);
            w.field(&["sensors", "board", "power", sensor, "power"], power.power);
        }
        w
    }

    fn motor_sensor_writes(&self, report: &MotorSensorReport) -> Writes {
        let creature = self.resolve_creature(&report.creature_id, report.creature_name.as_deref());
        let mut w = Writes::new(&[creature.key.as_str()], self.retain);
        self.creature_identity(&mut w, &report.creature_id, &creature);

        for motor in &report.motors {
            let number = motor.motor_number.to_string();
            let number = number.as_str();
            w.field(&["sensors", "motors", number, "position"], motor.position);
            w.field(&["sensors", "motors", number, "current"], motor.current);
            w.field(&["sensors", "motors", number, "power"], motor.power);
            w.field(&["sensors", "motors", number, "voltage"], motor.voltage);
        }
        w.field(&["sensors", "motors", "timestamp"], report.timestamp);
        w
    }

    fn activity_writes(&self, activity: &CreatureActivity) -> Writes {
        let creature =
            self.resolve_creature(&activity.creature_id, activity.creature_name.as_deref());
        let mut w = Writes::new(&[creature.key.as_str()], self.retain);
        self.creature_identity(&mut w, &activity.creature_id, &creature);

        w.field(&["activity", "state"], activity.state.as_str());
        match activity.animation_id.as_deref().filter(|id| !id.is_empty()) {
            Some(animation_id) => {
                let animation = self.animations.resolve(
                    animation_id,
                    None,
                    Some(self.animation_fetch(animation_id)),
                );
                w.identity(&["activity", "animation_id"], animation_id);
                w.identity(&["activity", "animation_name"], animation.display());
            }
            None => {
                // Empty retained payloads clear whatever was playing before
                w.identity(&["activity", "animation_id"], "");
                w.identity(&["activity", "animation_name"], "");
            }
        }
        w.optional(&["activity", "session_id"], activity.session_id.as_deref());
        w.optional(&["activity", "reason"], activity.reason.as_deref());
        w.optional(&["activity", "started_at"], activity.started_at);
        w.optional(&["activity", "updated_at"], activity.updated_at);
        w.field(&["activity", "name"], creature.display());
        w.field(&["activity", "timestamp"], activity.timestamp);
        w
    }

    fn playlist_writes(&self, status: &PlaylistStatus) -> Writes {
        let universe = status.universe.to_string();
        let mut w = Writes::new(&["playlist", universe.as_str()], self.retain);
        w.field(&["playing"], status.playing);
        w.field(&["playlist_id"], status.playlist_id.as_deref().unwrap_or(""));
        match status.current_animation_id.as_deref().filter(|id| !id.is_empty()) {
            Some(animation_id) => {
                let animation = self.animations.resolve(
                    animation_id,
                    None,
                    Some(self.animation_fetch(animation_id)),
                );
                w.identity(&["current_animation_id"], animation_id);
                w.identity(&["current_animation_name"], animation.display());
            }
            None => {
                w.identity(&["current_animation_id"], "");
                w.identity(&["current_animation_name"], "");
            }
        }
        w.field(&["timestamp"], status.timestamp);
        w
    }

    async fn publish_all(&self, writes: Writes) -> ProcessSummary {
        let mut summary = ProcessSummary::default();

        for write in writes.writes {
            let topic = self.topics.topic(&write.components);
            let payload = write.value.to_payload();

            if !self.dedup.should_publish(&topic, &payload) {
                summary.unchanged += 1;
                continue;
            }

            match self.connector.publish(&topic, &payload, write.retain).await {
                Ok(()) => {
                    self.dedup.record_published(&topic, &payload);
                    summary.published += 1;
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Publish failed, skipping field");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Reload the animation name table in the background.
    ///
    /// Runs at startup and on every animation-scoped cache invalidation.
    pub fn reload_animation_names(&self) {
        let lookup = Arc::clone(&self.lookup);
        let animations = self.animations.clone();

        let mut reloads = self.lock_reloads();
        while reloads.try_join_next().is_some() {}
        reloads.spawn(async move {
            match load_animation_names(lookup.as_ref()).await {
                Ok(names) => {
                    info!(animations = names.len(), "Reloaded animation names");
                    animations.replace_all(names);
                }
                Err(e) => warn!(error = %e, "Animation name reload failed; keeping current names"),
            }
        });
    }

    /// Wait for outstanding name fetches and reloads (tests, orderly shutdown).
    pub async fn join_background(&self) {
        let mut reloads = std::mem::take(&mut *self.lock_reloads());
        while reloads.join_next().await.is_some() {}
        self.creatures.join_pending_fetches().await;
        self.animations.join_pending_fetches().await;
    }

    /// Abort background lookups.
    pub fn shutdown(&self) {
        self.lock_reloads().abort_all();
        self.creatures.shutdown();
        self.animations.shutdown();
    }
}

/// Merge the stored and ad-hoc animation tables; ad-hoc wins on collision.
pub fn merge_animation_names(
    stored: HashMap<String, String>,
    ad_hoc: HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = stored;
    merged.extend(ad_hoc);
    merged
}

async fn load_animation_names(lookup: &dyn NameLookup) -> Result<HashMap<String, String>> {
    let (stored, ad_hoc) = tokio::join!(
        lookup.list_animation_names(),
        lookup.list_ad_hoc_animation_names()
    );
    let stored = stored.context("Failed to list stored animations")?;
    let ad_hoc = ad_hoc.context("Failed to list ad-hoc animations")?;
    Ok(merge_animation_names(stored, ad_hoc))
}
