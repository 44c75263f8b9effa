//! Trigger payloads of every accepted shape through admission and cooldown.

use creature_mqtt::admission::{parse_timestamp, Admission, EventAdmissionController};
use std::time::Duration;

fn admit(controller: &EventAdmissionController, topic: &str, payload: &str, retained: bool) -> Admission {
    controller.admit(topic, parse_timestamp(payload), retained)
}

#[test]
fn test_mixed_payload_shapes_order_on_one_clock() {
    let controller = EventAdmissionController::new();
    let topic = "porch/motion";

    // Epoch seconds, then the same instant in milliseconds
    assert!(admit(&controller, topic, "1730399405", false).is_admitted());
    assert!(!admit(&controller, topic, "1730399405000", false).is_admitted());

    // ISO-8601 half a second later
    assert!(admit(&controller, topic, "2024-10-31T18:30:05.500Z", false).is_admitted());

    // JSON wrapper with a string timestamp, earlier again
    assert!(!admit(&controller, topic, r#"{"timestamp":"2024-10-31T18:30:05Z"}"#, false).is_admitted());

    // JSON wrapper with a millisecond number, later
    assert!(admit(&controller, topic, r#"{"timestamp":1730399406000}"#, false).is_admitted());
    assert_eq!(controller.last_seen_timestamp(topic), Some(1_730_399_406.0));
}

#[test]
fn test_bootstrap_from_several_retained_topics() {
    let controller = EventAdmissionController::new();

    assert_eq!(
        admit(&controller, "porch/motion", "500", true),
        Admission::Baseline { timestamp: 500.0 }
    );
    assert_eq!(
        admit(&controller, "garage/motion", "700", true),
        Admission::Baseline { timestamp: 700.0 }
    );

    assert!(!admit(&controller, "porch/motion", "450", false).is_admitted());
    assert!(admit(&controller, "garage/motion", "701", false).is_admitted());
    assert!(!controller.has_seen_live("porch/motion"));
    assert!(controller.has_seen_live("garage/motion"));
}

#[test]
fn test_garbage_payload_is_unorderable() {
    let controller = EventAdmissionController::new();
    assert_eq!(admit(&controller, "t", "motion detected", false), Admission::Unorderable);
    assert_eq!(admit(&controller, "t", r#"{"state":"on"}"#, false), Admission::Unorderable);
    assert!(controller.record("t").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_restarts_only_when_marked() {
    let controller = EventAdmissionController::new();

    assert!(admit(&controller, "porch/motion", "1000", false).is_admitted());
    controller.mark_area_processed("porch");

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(controller.cooldown_window("porch", 30.0), None);

    // Admitted but never marked: the window stays open
    assert!(admit(&controller, "porch/motion", "1031", false).is_admitted());
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(controller.cooldown_window("porch", 30.0), None);
}
