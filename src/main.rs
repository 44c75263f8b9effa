use anyhow::{Context, Result};
use clap::Parser;
use creature_mqtt::config::{load_config, BridgeConfig};
use creature_mqtt::mqtt::{ConnectionHealth, Connector, MqttConnector};
use creature_mqtt::processor::EventProcessor;
use creature_mqtt::upstream::{run_event_stream, HttpNameLookup};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Bridge creature server events onto MQTT topics
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CREATURE_MQTT_CONFIG")]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// Use TLS for the broker connection
    #[arg(long)]
    mqtt_tls: bool,

    #[arg(long)]
    mqtt_username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,

    /// Keep-alive interval in seconds
    #[arg(long)]
    mqtt_keepalive: Option<u64>,

    #[arg(long)]
    mqtt_client_id: Option<String>,

    /// Root of every published topic
    #[arg(long)]
    topic_prefix: Option<String>,

    /// Retain non-identity fields
    #[arg(long)]
    retain: bool,

    /// Only publish these event types (repeatable)
    #[arg(long = "allow")]
    allow: Vec<String>,

    /// Never publish these event types (repeatable)
    #[arg(long = "deny")]
    deny: Vec<String>,

    /// Creature server host
    #[arg(long)]
    server_host: Option<String>,

    /// Creature server port
    #[arg(long)]
    server_port: Option<u16>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.mqtt_host {
            config.mqtt.host = host.clone();
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt.port = port;
        }
        if self.mqtt_tls {
            config.mqtt.tls = true;
        }
        if let Some(username) = &self.mqtt_username {
            config.mqtt.username = Some(username.clone());
        }
        if let Some(password) = &self.mqtt_password {
            config.mqtt.password = Some(password.clone());
        }
        if let Some(keep_alive) = self.mqtt_keepalive {
            config.mqtt.keep_alive_secs = keep_alive;
        }
        if let Some(client_id) = &self.mqtt_client_id {
            config.mqtt.client_id = Some(client_id.clone());
        }
        if let Some(prefix) = &self.topic_prefix {
            config.bridge.topic_prefix = prefix.clone();
        }
        if self.retain {
            config.bridge.retain = true;
        }
        if !self.allow.is_empty() {
            config.bridge.allow = self.allow.clone();
        }
        if !self.deny.is_empty() {
            config.bridge.deny = self.deny.clone();
        }
        if let Some(host) = &self.server_host {
            config.creature_server.host = host.clone();
        }
        if let Some(port) = self.server_port {
            config.creature_server.port = port;
        }
    }
}

async fn log_health(mut health: watch::Receiver<ConnectionHealth>) {
    while health.changed().await.is_ok() {
        let state = health.borrow_and_update().clone();
        match state {
            ConnectionHealth::Connected => info!("MQTT connector healthy"),
            ConnectionHealth::Degraded { attempt } => {
                warn!(attempt = attempt, "MQTT connector degraded")
            }
            ConnectionHealth::Reconnecting { attempt } => {
                info!(attempt = attempt, "MQTT connector reconnecting")
            }
            ConnectionHealth::Connecting => {}
        }
    }
}

async fn wait_for_stop(duration: Option<u64>) -> Result<()> {
    match duration {
        Some(secs) => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!(seconds = secs, "Run duration elapsed");
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl_c signal")?;
            info!("Shutdown signal received");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creature_mqtt=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    let processor_config = config.bridge.processor_config()?;

    info!(
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        creature_server = %config.creature_server.base_url(),
        topic_prefix = %config.bridge.topic_prefix,
        "Creature MQTT bridge starting"
    );

    let lookup = Arc::new(HttpNameLookup::new(&config.creature_server.base_url())?);

    // The bridge only publishes; incoming deliveries are never read
    let (connector, _incoming) = MqttConnector::connect(&config.mqtt, "creature-mqtt");
    let connector = Arc::new(connector);
    let health_handle = tokio::spawn(log_health(connector.health()));

    let processor = EventProcessor::new(connector.clone(), lookup, processor_config);
    processor.reload_animation_names();

    let (event_tx, event_rx) = mpsc::channel(256);
    let stream_handle = tokio::spawn(run_event_stream(
        config.creature_server.ws_url(),
        config.mqtt.reconnect_state(),
        event_tx,
    ));

    tokio::select! {
        _ = processor.run(event_rx) => {
            warn!("Event stream ended");
        }
        result = wait_for_stop(cli.duration) => {
            if let Err(e) = result {
                warn!(error = %e, "Stopping without a shutdown signal");
            }
        }
    }

    // Graceful shutdown
    stream_handle.abort();
    connector.disconnect().await;
    processor.shutdown();
    health_handle.abort();
    info!(
        tracked_topics = processor.deduplicator().len(),
        "Creature MQTT bridge stopped"
    );

    Ok(())
}
