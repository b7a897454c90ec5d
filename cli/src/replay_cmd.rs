use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use factory_bridge_core::Bridge;
use factory_bridge_core::BridgeConfig;
use factory_bridge_core::relay::RelayReport;
use factory_bridge_core::remote::OneM2mClient;
use factory_bridge_core::transport::LogPublisher;
use factory_bridge_core::transport::MqttTransport;
use factory_bridge_core::transport::Publisher;
use tokio::sync::mpsc;
use tokio::sync::watch;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Relays one snapshot file: provisions its resources and publishes once.
#[derive(Debug, Parser)]
pub struct ReplayArgs {
    /// Snapshot JSON as returned by the game server.
    #[arg(long = "file", value_name = "PATH")]
    pub file: PathBuf,

    /// Log payloads instead of publishing them to the broker.
    #[arg(long = "dry-run", default_value_t = false)]
    pub dry_run: bool,
}

pub async fn run(config: BridgeConfig, args: ReplayArgs) -> Result<RelayReport> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let api = OneM2mClient::new(&config.remote).context("failed to build HTTP client")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut mqtt_task = None;
    let publisher: Arc<dyn Publisher> = if args.dry_run {
        Arc::new(LogPublisher)
    } else {
        let layout = config.layout()?;
        // Inbound messages are not handled during a replay.
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let (mqtt, task) = MqttTransport::start(
            &config.mqtt,
            layout.inbound_filter(),
            inbound_tx,
            shutdown_rx,
        );
        let broker = format!("{}:{}", config.mqtt.host, config.mqtt.port);
        mqtt.wait_connected(CONNECT_TIMEOUT)
            .await
            .with_context(|| format!("failed to connect to {broker}"))?;
        mqtt_task = Some(task);
        Arc::new(mqtt)
    };

    let bridge = Bridge::new(config, Arc::new(api), publisher)?;
    let report = bridge
        .relay_once(&raw)
        .await
        .with_context(|| format!("failed to relay {}", args.file.display()))?;

    shutdown_tx.send_replace(true);
    if let Some(task) = mqtt_task {
        task.await.context("mqtt event loop task failed")?;
    }
    Ok(report)
}
