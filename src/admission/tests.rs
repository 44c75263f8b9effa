use super::*;
use std::time::Duration;

#[test]
fn test_missing_timestamp_rejected() {
    let controller = EventAdmissionController::new();
    assert!(!controller.should_process("porch/motion", None));
    assert!(controller.record("porch/motion").is_none());
}

#[test]
fn test_increasing_timestamps_accepted() {
    let controller = EventAdmissionController::new();

    assert!(controller.should_process("porch/motion", Some(1.0)));
    assert!(controller.should_process("porch/motion", Some(2.0)));
    assert!(!controller.should_process("porch/motion", Some(1.0)));
    assert_eq!(controller.last_seen_timestamp("porch/motion"), Some(2.0));
}

#[test]
fn test_duplicate_timestamp_rejected() {
    let controller = EventAdmissionController::new();

    assert!(controller.should_process("t", Some(1000.0)));
    assert!(!controller.should_process("t", Some(1000.0)));
}

#[test]
fn test_topics_are_ordered_independently() {
    let controller = EventAdmissionController::new();

    assert!(controller.should_process("a", Some(50.0)));
    assert!(controller.should_process("b", Some(10.0)));
    assert!(!controller.should_process("a", Some(10.0)));
}

#[test]
fn test_retained_message_becomes_baseline() {
    let controller = EventAdmissionController::new();

    assert_eq!(
        controller.admit("porch/motion", Some(900.0), true),
        Admission::Baseline { timestamp: 900.0 }
    );
    assert!(!controller.has_seen_live("porch/motion"));
    assert_eq!(controller.last_seen_timestamp("porch/motion"), Some(900.0));

    // A live replay of the same value is not new
    assert_eq!(
        controller.admit("porch/motion", Some(900.0), false),
        Admission::Stale { timestamp: 900.0, last_seen: 900.0 }
    );

    assert!(controller.admit("porch/motion", Some(901.0), false).is_admitted());
    assert!(controller.has_seen_live("porch/motion"));
}

#[test]
fn test_retained_after_live_goes_through_ordering() {
    let controller = EventAdmissionController::new();

    assert!(controller.admit("t", Some(10.0), false).is_admitted());

    // Broker re-delivers the retained copy after a reconnect
    assert_eq!(
        controller.admit("t", Some(10.0), true),
        Admission::Stale { timestamp: 10.0, last_seen: 10.0 }
    );
    assert!(controller.admit("t", Some(11.0), true).is_admitted());
}

#[test]
fn test_baseline_never_moves_backwards() {
    let controller = EventAdmissionController::new();

    controller.update_initial_timestamp("t", 20.0);
    controller.update_initial_timestamp("t", 5.0);
    assert_eq!(controller.last_seen_timestamp("t"), Some(20.0));

    assert!(controller.should_process("t", Some(30.0)));
    controller.update_initial_timestamp("t", 100.0);
    assert_eq!(controller.last_seen_timestamp("t"), Some(30.0));
}

#[test]
fn test_unorderable_admission() {
    let controller = EventAdmissionController::new();
    assert_eq!(controller.admit("t", None, true), Admission::Unorderable);
    assert_eq!(controller.admit("t", None, false), Admission::Unorderable);
}

#[test]
fn test_non_finite_timestamps_are_unorderable() {
    let controller = EventAdmissionController::new();

    assert!(!controller.should_process("t", Some(f64::NAN)));
    assert!(!controller.should_process("t", Some(f64::INFINITY)));
    assert_eq!(controller.admit("t", Some(f64::NAN), false), Admission::Unorderable);
    assert_eq!(controller.admit("t", Some(f64::NAN), true), Admission::Unorderable);
    controller.update_initial_timestamp("t", f64::NAN);
    assert_eq!(controller.last_seen_timestamp("t"), None);

    // Ordering still works afterwards
    assert!(controller.should_process("t", Some(5.0)));
    assert!(!controller.should_process("t", Some(4.0)));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_disabled() {
    let controller = EventAdmissionController::new();
    controller.mark_area_processed("porch");

    assert_eq!(controller.cooldown_window("porch", 0.0), None);
    assert_eq!(controller.cooldown_window("porch", -5.0), None);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_unknown_area_is_clear() {
    let controller = EventAdmissionController::new();
    assert_eq!(controller.cooldown_window("garage", 30.0), None);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_counts_down_and_expires() {
    let controller = EventAdmissionController::new();
    controller.mark_area_processed("porch");

    tokio::time::advance(Duration::from_secs(5)).await;
    let remaining = controller.cooldown_window("porch", 30.0).unwrap();
    assert!((remaining - 25.0).abs() < 0.01, "remaining = {}", remaining);

    tokio::time::advance(Duration::from_secs(26)).await;
    assert_eq!(controller.cooldown_window("porch", 30.0), None);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_is_per_area() {
    let controller = EventAdmissionController::new();
    controller.mark_area_processed("porch");

    assert!(controller.cooldown_window("porch", 30.0).is_some());
    assert_eq!(controller.cooldown_window("garage", 30.0), None);
}
