use crate::event::ServerEvent;
use crate::mqtt::ReconnectState;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Decode one websocket text frame.
///
/// Frames with an unknown `command` return `None` so newer servers don't break
/// older bridges.
pub(crate) fn decode_frame(text: &str) -> Option<ServerEvent> {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            let command = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("command").and_then(|c| c.as_str()).map(str::to_string));
            match command {
                Some(command) => debug!(command = %command, error = %e, "Skipping unhandled frame"),
                None => warn!(error = %e, "Skipping malformed frame"),
            }
            None
        }
    }
}

/// Stream events from the creature server websocket into `tx`.
///
/// Reconnects forever with `backoff`; returns once the receiver is dropped.
pub async fn run_event_stream(url: String, mut backoff: ReconnectState, tx: mpsc::Sender<ServerEvent>) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((mut socket, _response)) => {
                info!(url = %url, "Connected to creature server event stream");
                backoff.reset();

                while let Some(next) = socket.next().await {
                    let text = match next {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(error = %e, "Event stream read error");
                            break;
                        }
                    };

                    let Some(event) = decode_frame(&text) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        info!("Event receiver dropped; stopping event stream");
                        return;
                    }
                }

                warn!(url = %url, "Event stream disconnected");
            }
            Err(e) => {
                warn!(url = %url, error = %e, attempt = backoff.attempt_count() + 1, "Failed to connect to event stream");
            }
        }

        if tx.is_closed() {
            return;
        }

        let delay = backoff.next_delay();
        if backoff.is_degraded() {
            warn!(
                attempt = backoff.attempt_count(),
                delay_ms = delay.as_millis() as u64,
                "Creature server unreachable; still retrying"
            );
        }
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_decode_known_frame() {
        let event = decode_frame(
            r#"{"command": "emergency-stop", "payload": {"reason": "button", "timestamp": "2025-01-01T00:00:00Z"}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::EmergencyStop);
    }

    #[test]
    fn test_decode_skips_unknown_and_garbage() {
        assert!(decode_frame(r#"{"command": "future-thing", "payload": {}}"#).is_none());
        assert!(decode_frame("not json").is_none());
    }
}
