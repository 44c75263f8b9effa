// Event admission for trigger topics
pub mod admission;

// TOML configuration and validation
pub mod config;

// Publish de-duplication
pub mod dedup;

// Creature server event model
pub mod event;

// MQTT connector, reconnect policy and topic construction
pub mod mqtt;

// Event fan-out into topic writes
pub mod processor;

// Single-flight id to name caches
pub mod resolver;

// Creature server REST and websocket adapters
pub mod upstream;

pub use admission::{Admission, EventAdmissionController};
pub use dedup::{FieldValue, PublishDeduplicator};
pub use mqtt::{Connector, IncomingMessage, MqttConnector, TransportError};
pub use processor::{EventProcessor, ProcessorConfig};
pub use resolver::ResolverCache;
