//! Source RCON client used to ask the game server for snapshots.
//!
//! Wire format, all integers little-endian:
//! `size:i32 | id:i32 | type:i32 | body | 0x00 | 0x00`, where `size` counts
//! everything after itself.

use async_trait::async_trait;
use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::SnapshotSource;
use super::TransportError;
use crate::config::RconConfig;

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// id + type + two NUL terminators.
const MIN_PACKET_SIZE: usize = 10;
const MAX_PACKET_SIZE: usize = 64 * 1024 * 1024;
const AUTH_REJECTED_ID: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Packet {
    id: i32,
    kind: i32,
    body: String,
}

impl Packet {
    fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    fn encode(&self) -> Result<BytesMut, TransportError> {
        let body = self.body.as_bytes();
        let size = MIN_PACKET_SIZE + body.len();
        let prefix = i32::try_from(size)
            .ok()
            .filter(|_| size <= MAX_PACKET_SIZE)
            .ok_or_else(|| {
                TransportError::Protocol(format!("packet of {size} bytes is too large"))
            })?;
        let mut buf = BytesMut::with_capacity(4 + size);
        buf.put_i32_le(prefix);
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.kind);
        buf.put_slice(body);
        buf.put_u8(0);
        buf.put_u8(0);
        Ok(buf)
    }

    /// Decodes everything after the size prefix.
    fn decode(mut frame: &[u8]) -> Result<Self, TransportError> {
        if frame.len() < MIN_PACKET_SIZE {
            return Err(TransportError::Protocol(format!(
                "packet of {} bytes is too short",
                frame.len()
            )));
        }
        let id = frame.get_i32_le();
        let kind = frame.get_i32_le();
        let body = frame
            .strip_suffix(&[0, 0])
            .ok_or_else(|| {
                TransportError::Protocol("packet body is not NUL terminated".to_string())
            })?;
        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

async fn read_packet<R>(reader: &mut R) -> Result<Packet, TransportError>
where
    R: AsyncRead + Unpin,
{
    let size = reader.read_i32_le().await?;
    let size = usize::try_from(size).unwrap_or(0);
    if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
        return Err(TransportError::Protocol(format!("invalid packet size {size}")));
    }
    let mut frame = vec![0u8; size];
    reader.read_exact(&mut frame).await?;
    Packet::decode(&frame)
}

struct RconConnection {
    stream: TcpStream,
    next_id: i32,
}

impl RconConnection {
    async fn connect(config: &RconConfig) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let mut conn = Self { stream, next_id: 1 };

        let auth_id = conn.next_id();
        conn.send(&Packet::new(auth_id, SERVERDATA_AUTH, config.password.as_str()))
            .await?;
        loop {
            // Some servers send an empty response value before the auth answer.
            let packet = read_packet(&mut conn.stream).await?;
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if packet.id == AUTH_REJECTED_ID {
                return Err(TransportError::AuthRejected(addr));
            }
            return Ok(conn);
        }
    }

    fn next_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let buf = packet.encode()?;
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    /// Runs `command` and returns its full output. An empty command is sent
    /// right after it; its answer marks the end of a multi-packet response.
    async fn exec(&mut self, command: &str) -> Result<String, TransportError> {
        let id = self.next_id();
        let marker = self.next_id();
        self.send(&Packet::new(id, SERVERDATA_EXECCOMMAND, command))
            .await?;
        self.send(&Packet::new(marker, SERVERDATA_EXECCOMMAND, ""))
            .await?;

        let mut body = String::new();
        loop {
            let packet = read_packet(&mut self.stream).await?;
            if packet.id == marker {
                return Ok(body);
            }
            if packet.id == id && packet.kind == SERVERDATA_RESPONSE_VALUE {
                body.push_str(&packet.body);
            } else {
                debug!(id = packet.id, kind = packet.kind, "ignoring unexpected rcon packet");
            }
        }
    }
}

#[derive(Default)]
struct RconState {
    conn: Option<RconConnection>,
    retry_after: Option<Instant>,
}

/// Polls the game server over one long-lived RCON connection.
///
/// Polls are serialized on that connection. A failed poll drops it; the
/// next poll after `reconnect_delay` connects again.
pub struct RconSource {
    config: RconConfig,
    state: Mutex<RconState>,
}

impl RconSource {
    pub fn new(config: RconConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RconState::default()),
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn connect(&self, state: &mut RconState) -> Result<(), TransportError> {
        if let Some(retry_after) = state.retry_after {
            let now = Instant::now();
            if now < retry_after {
                return Err(TransportError::Backoff(retry_after - now));
            }
        }
        let connect = RconConnection::connect(&self.config);
        let result = match timeout(self.config.timeout(), connect).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.config.timeout())),
        };
        match result {
            Ok(conn) => {
                info!(addr = %self.addr(), "connected to rcon");
                state.conn = Some(conn);
                state.retry_after = None;
                Ok(())
            }
            Err(err) => {
                warn!(addr = %self.addr(), "rcon connect failed: {err}");
                state.retry_after = Some(Instant::now() + self.config.reconnect_delay());
                Err(err)
            }
        }
    }
}

#[async_trait]
impl SnapshotSource for RconSource {
    async fn poll(&self) -> Result<String, TransportError> {
        let mut state = self.state.lock().await;
        if state.conn.is_none() {
            self.connect(&mut state).await?;
        }
        let Some(conn) = state.conn.as_mut() else {
            return Err(TransportError::Disconnected);
        };

        let limit: Duration = self.config.timeout();
        let result = match timeout(limit, conn.exec(&self.config.command)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        };
        match result {
            Ok(body) => Ok(body.trim().to_string()),
            Err(err) => {
                warn!(addr = %self.addr(), "rcon connection lost: {err}");
                state.conn = None;
                Err(err)
            }
        }
    }
}
