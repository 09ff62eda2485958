use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use linkhub_adapter_mqtt::MqttClient;
use linkhub_adapter_storage_json::JsonFileStore;
use linkhub_adapter_virtual::VirtualModem;
use linkhubd::config::Config;
use linkhubd::hub::Hub;
use tracing_subscriber::EnvFilter;

/// How often overdue replies are checked.
const TIMEOUT_TICK: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|err| {
            eprintln!("invalid log filter '{}': {err}", config.logging.filter);
            EnvFilter::new("info")
        }))
        .init();

    // Link
    let (link, mut inbound) = VirtualModem::new(config.modem.address);
    let link = Arc::new(link);

    // Devices
    let store = Arc::new(JsonFileStore::new(&config.modem.db_path));
    let hub = Hub::build(&config, link.clone(), store).context("failed to build hub")?;
    for addr in hub.registry().addresses() {
        link.attach(addr, 0);
    }

    // MQTT
    let mut bridges = Vec::new();
    let mqtt = if config.mqtt.enabled {
        let mut client = MqttClient::new(&config.mqtt)?;
        bridges = hub.bridges(&config.mqtt, &client.publisher())?;
        for bridge in &bridges {
            client.add_bridge(Arc::clone(bridge));
        }
        tracing::info!(
            host = %config.mqtt.broker_host,
            port = config.mqtt.broker_port,
            bridges = bridges.len(),
            "MQTT enabled"
        );
        Some(client)
    } else {
        None
    };
    let mqtt = async move {
        match mqtt {
            Some(client) => client.run().await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(mqtt);

    let mut mqtt_stopped = false;
    let mut ticker = tokio::time::interval(TIMEOUT_TICK);
    tracing::info!(devices = hub.devices().len(), "linkhubd running");

    loop {
        tokio::select! {
            Some(msg) = inbound.recv() => {
                if let Err(err) = hub.process(&msg) {
                    tracing::error!(%msg, error = %err, "reply handler contract violation");
                }
            }
            _ = ticker.tick() => hub.protocol().poll_timeout(Instant::now()),
            () = &mut mqtt, if !mqtt_stopped => {
                mqtt_stopped = true;
                tracing::warn!("MQTT loop stopped");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "failed to listen for shutdown signal");
                }
                tracing::info!("shutting down");
                break;
            }
        }
    }

    drop(bridges);
    Ok(())
}
