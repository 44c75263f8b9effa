use crate::action::{DownstreamActionError, Responder, SpeechDispatcher};
use crate::config::TriggerConfig;
use creature_mqtt::admission::{parse_timestamp, Admission, EventAdmissionController};
use creature_mqtt::mqtt::{Connector, IncomingMessage, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What the agent did with one delivered message
#[derive(Debug, PartialEq)]
pub enum TriggerOutcome {
    /// No trigger is configured for the topic
    Unmatched,
    /// Payload carried no usable timestamp
    Unorderable,
    /// Retained replay recorded as the ordering baseline
    Baseline,
    /// At or before the last admitted timestamp
    Stale,
    /// Admitted, but the area acted too recently
    CoolingDown { remaining_seconds: f64 },
    /// Speech job queued; the area's cooldown restarted
    Dispatched { job_id: String },
    /// Admitted, but the action failed; the area stays clear
    Failed,
}

/// Reacts to trigger topics with generated speech.
pub struct Agent {
    triggers: HashMap<String, TriggerConfig>,
    admission: EventAdmissionController,
    responder: Arc<dyn Responder>,
    dispatcher: Arc<dyn SpeechDispatcher>,
}

impl Agent {
    pub fn new(
        triggers: Vec<TriggerConfig>,
        responder: Arc<dyn Responder>,
        dispatcher: Arc<dyn SpeechDispatcher>,
    ) -> Self {
        Self {
            triggers: triggers
                .into_iter()
                .map(|trigger| (trigger.topic.clone(), trigger))
                .collect(),
            admission: EventAdmissionController::new(),
            responder,
            dispatcher,
        }
    }

    /// Every topic to subscribe to, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.triggers.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn admission(&self) -> &EventAdmissionController {
        &self.admission
    }

    /// Admit, throttle and act on one message.
    pub async fn handle_message(&self, message: &IncomingMessage) -> TriggerOutcome {
        let Some(trigger) = self.triggers.get(&message.topic) else {
            debug!(topic = %message.topic, "No trigger for topic");
            return TriggerOutcome::Unmatched;
        };

        let timestamp = parse_timestamp(&message.payload_str());
        match self.admission.admit(&message.topic, timestamp, message.retained) {
            Admission::Unorderable => {
                warn!(topic = %message.topic, "Trigger payload has no timestamp; ignoring");
                return TriggerOutcome::Unorderable;
            }
            Admission::Baseline { timestamp } => {
                info!(topic = %message.topic, timestamp = timestamp, "Retained trigger recorded as baseline");
                return TriggerOutcome::Baseline;
            }
            Admission::Stale { timestamp, last_seen } => {
                debug!(
                    topic = %message.topic,
                    timestamp = timestamp,
                    last_seen = last_seen,
                    "Stale trigger"
                );
                return TriggerOutcome::Stale;
            }
            Admission::Admitted { .. } => {}
        }

        if let Some(remaining) = self
            .admission
            .cooldown_window(&trigger.area, trigger.cooldown_seconds)
        {
            info!(
                area = %trigger.area,
                remaining_seconds = remaining,
                "Area cooling down; skipping trigger"
            );
            return TriggerOutcome::CoolingDown {
                remaining_seconds: remaining,
            };
        }

        match self.dispatch(trigger).await {
            Ok(job_id) => {
                self.admission.mark_area_processed(&trigger.area);
                info!(
                    topic = %message.topic,
                    area = %trigger.area,
                    job_id = %job_id,
                    "Trigger handled"
                );
                TriggerOutcome::Dispatched { job_id }
            }
            Err(e) => {
                warn!(topic = %message.topic, area = %trigger.area, error = %e, "Trigger action failed");
                TriggerOutcome::Failed
            }
        }
    }

    async fn dispatch(&self, trigger: &TriggerConfig) -> Result<String, DownstreamActionError> {
        let text = self.responder.respond(&trigger.prompt).await?;
        self.dispatcher
            .create_ad_hoc_speech_animation(&trigger.creature_id, &text, trigger.resume_playlist)
            .await
    }

    /// Subscribe to every trigger topic and handle messages until the channel
    /// closes.
    pub async fn run(
        &self,
        connector: &dyn Connector,
        mut messages: mpsc::Receiver<IncomingMessage>,
    ) -> Result<(), TransportError> {
        let topics = self.topics();
        connector.subscribe(&topics).await?;
        info!(triggers = topics.len(), "Agent listening");

        while let Some(message) = messages.recv().await {
            self.handle_message(&message).await;
        }

        info!("Message channel closed; agent stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
