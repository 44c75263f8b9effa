//! The broker connector against a port nothing listens on.

use creature_mqtt::mqtt::{ConnectionHealth, Connector, MqttConfig, MqttConnector, TransportError};
use std::time::Duration;

fn unreachable_config() -> MqttConfig {
    MqttConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        initial_reconnect_delay_ms: 5,
        max_reconnect_delay_ms: 20,
        max_reconnect_failures: 3,
        ..MqttConfig::default()
    }
}

#[tokio::test]
async fn test_publish_fails_fast_while_disconnected() {
    let (connector, _incoming) = MqttConnector::connect(&unreachable_config(), "connector-test");

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        connector.publish("creatures/test", "1", false),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(TransportError::NotConnected)));
    assert!(!connector.is_connected());

    connector.disconnect().await;
}

#[tokio::test]
async fn test_refused_connections_report_degraded_health() {
    let (connector, _incoming) = MqttConnector::connect(&unreachable_config(), "connector-test");
    assert!(!connector.wait_connected(Duration::from_millis(50)).await);

    let mut health = connector.health();
    let reached = tokio::time::timeout(
        Duration::from_secs(10),
        health.wait_for(|h| matches!(h, ConnectionHealth::Degraded { .. })),
    )
    .await
    .unwrap()
    .map(|h| h.clone())
    .unwrap();

    match reached {
        ConnectionHealth::Degraded { attempt } => assert!(attempt >= 3, "attempt = {}", attempt),
        other => panic!("expected degraded, got {:?}", other),
    }

    connector.disconnect().await;
}

#[tokio::test]
async fn test_subscribe_while_disconnected_is_deferred() {
    let (connector, _incoming) = MqttConnector::connect(&unreachable_config(), "connector-test");

    let topics = vec!["porch/motion".to_string()];
    assert!(connector.subscribe(&topics).await.is_ok());

    connector.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_final() {
    let (connector, _incoming) = MqttConnector::connect(&unreachable_config(), "connector-test");

    connector.disconnect().await;
    connector.disconnect().await;

    let publish = connector.publish("creatures/test", "1", true).await;
    assert!(matches!(publish, Err(TransportError::Shutdown)));

    let subscribe = connector.subscribe(&["porch/motion".to_string()]).await;
    assert!(matches!(subscribe, Err(TransportError::Shutdown)));
}
