//! Speech agent for trigger topics.
//!
//! Listens on the MQTT topics named by `[[trigger]]` config tables. A message
//! is admitted in timestamp order per topic, throttled per area, and turned
//! into an ad-hoc speech animation on the configured creature.

pub mod action;
pub mod agent;
pub mod config;

pub use action::{
    CreatureServerClient, DownstreamActionError, OpenAiResponder, Responder, SpeechDispatcher,
};
pub use agent::{Agent, TriggerOutcome};
pub use config::{AgentConfig, OpenAiConfig, TriggerConfig};
