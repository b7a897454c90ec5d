//! Connections to the game server (polling) and the message broker (pub/sub).
//!
//! The relay engine only sees the two traits below; reconnects happen behind
//! them and show up as failed calls until the link is back.

mod mqtt;
mod rcon;

pub use mqtt::MqttTransport;
pub use rcon::RconSource;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    Disconnected,
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authentication rejected by {0}")]
    AuthRejected(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("waiting {0:?} before reconnecting")]
    Backoff(std::time::Duration),
    #[error("mqtt client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
}

/// A message delivered by the broker on one of the bridge's topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Produces one raw snapshot per call.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn poll(&self) -> Result<String, TransportError>;
}

/// At-most-once publishing to the broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// Publisher that only logs; used for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        info!(topic, bytes = payload.len(), "dry run publish");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
