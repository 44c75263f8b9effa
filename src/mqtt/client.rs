use super::{Connector, IncomingMessage, ReconnectState, TransportError};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Broker connection settings
#[derive(Clone, Debug, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    /// Falls back to `MQTT_PASSWORD` when unset
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Random `creature-mqtt-xxxxxxxx` when unset
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_initial_reconnect_delay_ms")]
    pub initial_reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Consecutive failures before the connector reports itself degraded
    #[serde(default = "default_max_reconnect_failures")]
    pub max_reconnect_failures: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_initial_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_max_reconnect_failures() -> u32 {
    10
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: false,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            client_id: None,
            initial_reconnect_delay_ms: default_initial_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_failures: default_max_reconnect_failures(),
        }
    }
}

impl MqttConfig {
    pub fn effective_client_id(&self, program: &str) -> String {
        match &self.client_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => {
                let suffix = Uuid::new_v4().simple().to_string();
                format!("{}-{}", program, &suffix[..8])
            }
        }
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        ReconnectState::new(
            Duration::from_millis(self.initial_reconnect_delay_ms),
            Duration::from_millis(self.max_reconnect_delay_ms),
            self.max_reconnect_failures,
        )
    }

    fn options(&self, client_id: String) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));

        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("MQTT_PASSWORD").ok());
        if let Some(username) = &self.username {
            options.set_credentials(username.clone(), password.unwrap_or_default());
        }

        if self.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        options
    }
}

/// Connector health as seen by the reconnect loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionHealth {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// `max_reconnect_failures` exceeded; still retrying at the max delay
    Degraded { attempt: u32 },
}

/// State shared between the connector handle and its event-loop task
struct Shared {
    connected: AtomicBool,
    shut_down: AtomicBool,
    subscriptions: Mutex<Vec<String>>,
    health_tx: watch::Sender<ConnectionHealth>,
}

/// MQTT connector backed by `rumqttc`.
///
/// The event loop runs in a background task that owns reconnects. Handles are
/// cheap to share behind an `Arc`.
pub struct MqttConnector {
    client: AsyncClient,
    shared: Arc<Shared>,
    health_rx: watch::Receiver<ConnectionHealth>,
    event_loop: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MqttConnector {
    /// Start the broker session.
    ///
    /// Returns immediately; the first connect attempt and every retry happen in
    /// the background. Delivered messages arrive on the returned receiver.
    pub fn connect(
        config: &MqttConfig,
        program: &str,
    ) -> (Self, mpsc::Receiver<IncomingMessage>) {
        let client_id = config.effective_client_id(program);
        info!(
            host = %config.host,
            port = config.port,
            tls = config.tls,
            client_id = %client_id,
            "Connecting to MQTT broker"
        );

        let (client, eventloop) = AsyncClient::new(config.options(client_id), 64);
        let (health_tx, health_rx) = watch::channel(ConnectionHealth::Connecting);
        let (message_tx, message_rx) = mpsc::channel(256);

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            health_tx,
        });

        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            Arc::clone(&shared),
            config.reconnect_state(),
            message_tx,
        ));

        let connector = Self {
            client,
            shared,
            health_rx,
            event_loop: tokio::sync::Mutex::new(Some(handle)),
        };

        (connector, message_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Watch health transitions (connected, reconnecting, degraded)
    pub fn health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health_rx.clone()
    }

    /// Wait until the broker session is up, or `timeout` elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.health_rx.clone();
        let wait = rx.wait_for(|h| *h == ConnectionHealth::Connected);
        let connected = matches!(tokio::time::timeout(timeout, wait).await, Ok(Ok(_)));
        connected
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError> {
        if self.shared.shut_down.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown);
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        // try_publish never waits on a full request queue
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        if self.shared.shut_down.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown);
        }

        {
            let mut subscriptions = self
                .shared
                .subscriptions
                .lock()
                .map_err(|_| TransportError::Subscribe("subscription table poisoned".to_string()))?;
            for topic in topics {
                if !subscriptions.contains(topic) {
                    subscriptions.push(topic.clone());
                }
            }
        }

        // While disconnected the ConnAck handler subscribes everything on the list
        if self.is_connected() {
            for topic in topics {
                self.client
                    .try_subscribe(topic.as_str(), QoS::AtLeastOnce)
                    .map_err(|e| TransportError::Subscribe(e.to_string()))?;
                info!(topic = %topic, "Subscribed");
            }
        }

        Ok(())
    }

    async fn disconnect(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let topics: Vec<String> = match self.shared.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        if self.is_connected() {
            for topic in &topics {
                let _ = self.client.try_unsubscribe(topic.as_str());
            }
            let _ = self.client.try_disconnect();
        }
        self.shared.connected.store(false, Ordering::SeqCst);

        if let Some(mut handle) = self.event_loop.lock().await.take() {
            // Let the loop flush the DISCONNECT before tearing it down
            if tokio::time::timeout(Duration::from_millis(500), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        info!("MQTT connector shut down");
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    shared: Arc<Shared>,
    mut backoff: ReconnectState,
    message_tx: mpsc::Sender<IncomingMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if backoff.attempt_count() > 0 {
                    info!(attempts = backoff.attempt_count(), "Reconnected to MQTT broker");
                } else {
                    info!("Connected to MQTT broker");
                }
                backoff.reset();
                shared.connected.store(true, Ordering::SeqCst);
                let _ = shared.health_tx.send(ConnectionHealth::Connected);

                let topics: Vec<String> = match shared.subscriptions.lock() {
                    Ok(subscriptions) => subscriptions.clone(),
                    Err(_) => Vec::new(),
                };
                for topic in topics {
                    match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        Ok(()) => info!(topic = %topic, "Subscribed"),
                        Err(e) => warn!(topic = %topic, error = %e, "Failed to subscribe"),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = IncomingMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retained: publish.retain,
                };
                if message_tx.send(message).await.is_err() {
                    debug!(topic = %publish.topic, "No receiver for incoming message");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                if shared.shut_down.load(Ordering::SeqCst) {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                shared.connected.store(false, Ordering::SeqCst);
                if shared.shut_down.load(Ordering::SeqCst) {
                    break;
                }

                let delay = backoff.next_delay();
                let attempt = backoff.attempt_count();
                if backoff.is_degraded() {
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "MQTT broker unreachable, connector degraded; still retrying"
                    );
                    let _ = shared.health_tx.send(ConnectionHealth::Degraded { attempt });
                } else {
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "MQTT connection failed, will retry"
                    );
                    let _ = shared.health_tx.send(ConnectionHealth::Reconnecting { attempt });
                }

                tokio::time::sleep(delay).await;
            }
        }
    }

    debug!("MQTT event loop stopped");
}
