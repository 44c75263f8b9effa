use super::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct ScriptedResponder {
    calls: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, prompt: &str) -> Result<String, DownstreamActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DownstreamActionError::Respond("model offline".to_string()));
        }
        Ok(format!("said: {}", prompt))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    requests: Mutex<Vec<(String, String, bool)>>,
}

#[async_trait]
impl SpeechDispatcher for RecordingDispatcher {
    async fn create_ad_hoc_speech_animation(
        &self,
        creature_id: &str,
        text: &str,
        resume_playlist: bool,
    ) -> Result<String, DownstreamActionError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push((creature_id.to_string(), text.to_string(), resume_playlist));
        Ok(format!("job-{}", requests.len()))
    }
}

fn porch_trigger() -> TriggerConfig {
    TriggerConfig {
        topic: "porch/motion".to_string(),
        area: "porch".to_string(),
        creature_id: "c-1".to_string(),
        prompt: "Someone is on the porch".to_string(),
        cooldown_seconds: 30.0,
        resume_playlist: true,
    }
}

fn doorbell_trigger() -> TriggerConfig {
    TriggerConfig {
        topic: "porch/doorbell".to_string(),
        prompt: "The doorbell rang".to_string(),
        resume_playlist: false,
        ..porch_trigger()
    }
}

fn agent(
    triggers: Vec<TriggerConfig>,
) -> (Agent, Arc<ScriptedResponder>, Arc<RecordingDispatcher>) {
    let responder = Arc::new(ScriptedResponder::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let agent = Agent::new(triggers, responder.clone(), dispatcher.clone());
    (agent, responder, dispatcher)
}

fn message(topic: &str, payload: &str, retained: bool) -> IncomingMessage {
    IncomingMessage {
        topic: topic.to_string(),
        payload: payload.as_bytes().to_vec(),
        retained,
    }
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_topic_is_ignored() {
    let (agent, responder, _) = agent(vec![porch_trigger()]);

    let outcome = agent.handle_message(&message("garage/motion", "1000", false)).await;
    assert_eq!(outcome, TriggerOutcome::Unmatched);
    assert_eq!(responder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_payload_without_timestamp_is_unorderable() {
    let (agent, responder, _) = agent(vec![porch_trigger()]);

    let outcome = agent.handle_message(&message("porch/motion", "motion!", false)).await;
    assert_eq!(outcome, TriggerOutcome::Unorderable);
    assert_eq!(responder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_passes_trigger_settings() {
    let (agent, _, dispatcher) = agent(vec![doorbell_trigger()]);

    let outcome = agent
        .handle_message(&message("porch/doorbell", r#"{"timestamp": 1730399405123}"#, false))
        .await;
    assert_eq!(
        outcome,
        TriggerOutcome::Dispatched {
            job_id: "job-1".to_string()
        }
    );

    let requests = dispatcher.requests.lock().unwrap();
    assert_eq!(
        requests[0],
        (
            "c-1".to_string(),
            "said: The doorbell rang".to_string(),
            false
        )
    );
}

#[tokio::test(start_paused = true)]
async fn test_retained_message_sets_baseline_only() {
    let (agent, responder, _) = agent(vec![porch_trigger()]);

    let outcome = agent.handle_message(&message("porch/motion", "1000", true)).await;
    assert_eq!(outcome, TriggerOutcome::Baseline);
    assert_eq!(responder.calls.load(Ordering::SeqCst), 0);

    // Replayed value is not new
    let outcome = agent.handle_message(&message("porch/motion", "1000", false)).await;
    assert_eq!(outcome, TriggerOutcome::Stale);

    let outcome = agent.handle_message(&message("porch/motion", "1001", false)).await;
    assert!(matches!(outcome, TriggerOutcome::Dispatched { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_event_is_stale() {
    let (agent, _, _) = agent(vec![porch_trigger()]);

    agent.handle_message(&message("porch/motion", "1000", false)).await;
    let outcome = agent.handle_message(&message("porch/motion", "999", false)).await;
    assert_eq!(outcome, TriggerOutcome::Stale);
}

#[tokio::test(start_paused = true)]
async fn test_topics_sharing_an_area_share_cooldown() {
    let (agent, _, dispatcher) = agent(vec![porch_trigger(), doorbell_trigger()]);

    let first = agent.handle_message(&message("porch/motion", "1000", false)).await;
    assert!(matches!(first, TriggerOutcome::Dispatched { .. }));

    tokio::time::advance(Duration::from_secs(2)).await;
    let second = agent.handle_message(&message("porch/doorbell", "1002", false)).await;
    assert!(matches!(second, TriggerOutcome::CoolingDown { .. }));
    assert_eq!(dispatcher.requests.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_action_leaves_area_clear() {
    let (agent, responder, dispatcher) = agent(vec![porch_trigger()]);
    responder.fail.store(true, Ordering::SeqCst);

    let outcome = agent.handle_message(&message("porch/motion", "1000", false)).await;
    assert_eq!(outcome, TriggerOutcome::Failed);
    assert!(agent.admission().cooldown_window("porch", 30.0).is_none());
    assert!(dispatcher.requests.lock().unwrap().is_empty());

    // The next ordered event retries straight away
    responder.fail.store(false, Ordering::SeqCst);
    let outcome = agent.handle_message(&message("porch/motion", "1001", false)).await;
    assert!(matches!(outcome, TriggerOutcome::Dispatched { .. }));
}

#[test]
fn test_topics_are_sorted() {
    let (agent, _, _) = agent(vec![porch_trigger(), doorbell_trigger()]);
    assert_eq!(
        agent.topics(),
        vec!["porch/doorbell".to_string(), "porch/motion".to_string()]
    );
}
