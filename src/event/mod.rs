use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;


fn now() -> DateTime<Utc> {
    Utc::now()
}

/// ServerEvent is one typed record from the creature server's event channel.
///
/// On the websocket each frame is `{"command": "<kind>", "payload": {...}}`
/// with the kind in kebab-case. Nothing outside `upstream` depends on that
/// framing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    BoardSensorReport(BoardSensorReport),
    MotorSensorReport(MotorSensorReport),
    EmergencyStop(EmergencyStop),
    Log(LogLine),
    PlaylistStatus(PlaylistStatus),
    StatusLights(StatusLights),
    ServerCounters(ServerCounters),
    JobProgress(JobProgress),
    JobComplete(JobComplete),
    IdleStateChanged(IdleState),
    CreatureActivity(CreatureActivity),
    CacheInvalidation(CacheInvalidation),
    UpsertCreature(CreatureRecord),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::BoardSensorReport(_) => EventKind::BoardSensorReport,
            ServerEvent::MotorSensorReport(_) => EventKind::MotorSensorReport,
            ServerEvent::EmergencyStop(_) => EventKind::EmergencyStop,
            ServerEvent::Log(_) => EventKind::Log,
            ServerEvent::PlaylistStatus(_) => EventKind::PlaylistStatus,
            ServerEvent::StatusLights(_) => EventKind::StatusLights,
            ServerEvent::ServerCounters(_) => EventKind::ServerCounters,
            ServerEvent::JobProgress(_) => EventKind::JobProgress,
            ServerEvent::JobComplete(_) => EventKind::JobComplete,
            ServerEvent::IdleStateChanged(_) => EventKind::IdleStateChanged,
            ServerEvent::CreatureActivity(_) => EventKind::CreatureActivity,
            ServerEvent::CacheInvalidation(_) => EventKind::CacheInvalidation,
            ServerEvent::UpsertCreature(_) => EventKind::UpsertCreature,
        }
    }
}

/// Event type names used by the allow/deny filter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    BoardSensorReport,
    MotorSensorReport,
    EmergencyStop,
    Log,
    PlaylistStatus,
    StatusLights,
    ServerCounters,
    JobProgress,
    JobComplete,
    IdleStateChanged,
    CreatureActivity,
    CacheInvalidation,
    UpsertCreature,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::BoardSensorReport,
        EventKind::MotorSensorReport,
        EventKind::EmergencyStop,
        EventKind::Log,
        EventKind::PlaylistStatus,
        EventKind::StatusLights,
        EventKind::ServerCounters,
        EventKind::JobProgress,
        EventKind::JobComplete,
        EventKind::IdleStateChanged,
        EventKind::CreatureActivity,
        EventKind::CacheInvalidation,
        EventKind::UpsertCreature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BoardSensorReport => "board-sensor-report",
            EventKind::MotorSensorReport => "motor-sensor-report",
            EventKind::EmergencyStop => "emergency-stop",
            EventKind::Log => "log",
            EventKind::PlaylistStatus => "playlist-status",
            EventKind::StatusLights => "status-lights",
            EventKind::ServerCounters => "server-counters",
            EventKind::JobProgress => "job-progress",
            EventKind::JobComplete => "job-complete",
            EventKind::IdleStateChanged => "idle-state-changed",
            EventKind::CreatureActivity => "creature-activity",
            EventKind::CacheInvalidation => "cache-invalidation",
            EventKind::UpsertCreature => "upsert-creature",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized event type name in configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown event type '{0}'")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    /// Accepts kebab-case or snake_case, any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerReport {
    pub name: String,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSensorReport {
    pub creature_id: String,
    #[serde(default)]
    pub creature_name: Option<String>,
    /// Degrees Fahrenheit
    pub board_temperature: f64,
    #[serde(default)]
    pub power_reports: Vec<PowerReport>,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotorReport {
    pub motor_number: u32,
    pub position: i64,
    pub current: f64,
    pub power: f64,
    pub voltage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotorSensorReport {
    pub creature_id: String,
    #[serde(default)]
    pub creature_name: Option<String>,
    #[serde(default)]
    pub motors: Vec<MotorReport>,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyStop {
    pub reason: String,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: String,
    pub message: String,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistStatus {
    pub universe: u32,
    pub playing: bool,
    #[serde(default)]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub current_animation_id: Option<String>,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusLights {
    pub running: bool,
    pub dmx: bool,
    pub streaming: bool,
    pub animation_playing: bool,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerCounters {
    pub counters: BTreeMap<String, u64>,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    /// 0.0 ..= 1.0
    pub progress: f64,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobComplete {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdleState {
    pub creature_id: String,
    pub idle_enabled: bool,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatureActivity {
    pub creature_id: String,
    #[serde(default)]
    pub creature_name: Option<String>,
    pub state: String,
    #[serde(default)]
    pub animation_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

/// Which server-side cache was invalidated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Animation,
    AdHocAnimationList,
    Creature,
    Playlist,
    SoundList,
    #[serde(other)]
    Unknown,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Animation => "animation",
            CacheType::AdHocAnimationList => "ad_hoc_animation_list",
            CacheType::Creature => "creature",
            CacheType::Playlist => "playlist",
            CacheType::SoundList => "sound_list",
            CacheType::Unknown => "unknown",
        }
    }

    /// Invalidations that make the animation name table stale
    pub fn is_animation_scoped(&self) -> bool {
        matches!(self, CacheType::Animation | CacheType::AdHocAnimationList)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheInvalidation {
    pub cache_type: CacheType,
    #[serde(default = "now")]
    pub timestamp: DateTime<Utc>,
}

/// Creature created or renamed on the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatureRecord {
    pub id: String,
    pub name: String,
}
