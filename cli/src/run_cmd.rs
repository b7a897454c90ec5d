use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use factory_bridge_core::Bridge;
use factory_bridge_core::BridgeConfig;
use factory_bridge_core::remote::OneM2mClient;
use factory_bridge_core::transport::MqttTransport;
use factory_bridge_core::transport::RconSource;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

const INBOUND_QUEUE: usize = 256;

/// Runs the bridge until Ctrl-C.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let layout = config.layout()?;
    let api = OneM2mClient::new(&config.remote).context("failed to build HTTP client")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);

    let (mqtt, mqtt_task) = MqttTransport::start(
        &config.mqtt,
        layout.inbound_filter(),
        inbound_tx,
        shutdown_rx.clone(),
    );
    let source = Arc::new(RconSource::new(config.rcon.clone()));
    info!(
        mobius = %config.remote.base_url,
        mqtt = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        rcon = %format!("{}:{}", config.rcon.host, config.rcon.port),
        "starting bridge"
    );
    let bridge = Bridge::new(config, Arc::new(api), Arc::new(mqtt))?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C; shutting down"),
            Err(err) => {
                warn!("failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        }
        shutdown_tx.send_replace(true);
    });

    bridge.run(source, inbound_rx, shutdown_rx).await;
    mqtt_task.await.context("mqtt event loop task failed")?;
    Ok(())
}
