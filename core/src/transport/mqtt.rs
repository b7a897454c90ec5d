use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::MqttOptions;
use rumqttc::Outgoing;
use rumqttc::Packet;
use rumqttc::QoS;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::InboundMessage;
use super::Publisher;
use super::TransportError;
use crate::config::MqttConfig;

const REQUEST_CAPACITY: usize = 64;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker connection shared by the outbound relay and the inbound path.
///
/// The event loop runs on its own task: it reconnects after errors,
/// subscribes `filter` again on every connection acknowledgement and
/// forwards incoming publishes to the inbound channel.
pub struct MqttTransport {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
}

impl MqttTransport {
    pub fn start(
        config: &MqttConfig,
        filter: String,
        inbound: mpsc::Sender<InboundMessage>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (connected_tx, connected_rx) = watch::channel(false);
        let driver = EventLoopDriver {
            client: client.clone(),
            filter,
            inbound,
            connected: connected_tx,
            reconnect_delay: config.reconnect_delay(),
            addr: format!("{}:{}", config.host, config.port),
        };
        let handle = tokio::spawn(driver.run(eventloop, shutdown));
        (
            Self {
                client,
                connected: connected_rx,
            },
            handle,
        )
    }

    /// Waits until the broker has acknowledged a connection.
    pub async fn wait_connected(&self, limit: Duration) -> Result<(), TransportError> {
        let mut connected = self.connected.clone();
        match tokio::time::timeout(limit, connected.wait_for(|up| *up)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }
}

#[async_trait]
impl Publisher for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

struct EventLoopDriver {
    client: AsyncClient,
    filter: String,
    inbound: mpsc::Sender<InboundMessage>,
    connected: watch::Sender<bool>,
    reconnect_delay: Duration,
    addr: String,
}

impl EventLoopDriver {
    async fn run(self, mut eventloop: EventLoop, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(addr = %self.addr, "closing mqtt connection");
                    self.flush(&mut eventloop).await;
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connected(),
                    Ok(Event::Incoming(Packet::Publish(publish))) => self.forward(InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload,
                    }),
                    Ok(_) => {}
                    Err(err) => {
                        if self.connected.send_replace(false) {
                            warn!(addr = %self.addr, "mqtt connection lost: {err}");
                        } else {
                            debug!(addr = %self.addr, "mqtt connect failed: {err}");
                        }
                        tokio::time::sleep(self.reconnect_delay).await;
                    }
                },
            }
        }
        self.connected.send_replace(false);
    }

    /// Sends the requests still queued, then the disconnect.
    async fn flush(&self, eventloop: &mut EventLoop) {
        if !*self.connected.borrow() || self.client.try_disconnect().is_err() {
            return;
        }
        let flushed = tokio::time::timeout(FLUSH_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            debug!(addr = %self.addr, "timed out flushing mqtt requests");
        }
    }

    fn on_connected(&self) {
        self.connected.send_replace(true);
        info!(addr = %self.addr, filter = %self.filter, "mqtt connected");
        if let Err(err) = self.client.try_subscribe(self.filter.clone(), QoS::AtMostOnce) {
            warn!(filter = %self.filter, "mqtt subscribe failed: {err}");
        }
    }

    fn forward(&self, message: InboundMessage) {
        match self.inbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(topic = %message.topic, "inbound queue full; dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("inbound receiver closed");
            }
        }
    }
}
