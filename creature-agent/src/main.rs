use anyhow::{Context, Result};
use clap::Parser;
use creature_agent::config::load_config;
use creature_agent::{Agent, CreatureServerClient, OpenAiResponder};
use creature_mqtt::mqtt::{Connector, MqttConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// React to MQTT trigger topics with generated creature speech
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CREATURE_AGENT_CONFIG")]
    config: PathBuf,

    /// MQTT broker host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    mqtt_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creature_agent=info,creature_mqtt=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(host) = cli.mqtt_host {
        config.mqtt.host = host;
    }
    if let Some(port) = cli.mqtt_port {
        config.mqtt.port = port;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        triggers = config.triggers.len(),
        model = %config.openai.model,
        "Creature agent starting"
    );

    let responder = Arc::new(OpenAiResponder::new(config.openai.clone())?);
    let dispatcher = Arc::new(CreatureServerClient::new(&config.creature_server.base_url())?);
    let agent = Agent::new(config.triggers.clone(), responder, dispatcher);

    let (connector, messages) = MqttConnector::connect(&config.mqtt, "creature-agent");

    tokio::select! {
        result = agent.run(&connector, messages) => {
            if let Err(e) = result {
                warn!(error = %e, "Agent stopped");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => warn!(error = %e, "Failed to listen for ctrl_c signal"),
            }
        }
    }

    // Graceful shutdown
    connector.disconnect().await;
    info!("Creature agent stopped");

    Ok(())
}
