//! Fakes and fixtures shared by the core integration tests.

use async_trait::async_trait;
use factory_bridge_core::BridgeConfig;
use factory_bridge_core::layout::ResourcePath;
use factory_bridge_core::remote::NotificationSpec;
use factory_bridge_core::remote::Originator;
use factory_bridge_core::remote::RemoteError;
use factory_bridge_core::remote::RemoteOutcome;
use factory_bridge_core::remote::RemoteResourceApi;
use factory_bridge_core::transport::Publisher;
use factory_bridge_core::transport::SnapshotSource;
use factory_bridge_core::transport::TransportError;
use serde_json::Value;
use serde_json::json;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call received by [`FakeRemoteApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateResource { parent: String, name: String },
    CreateNotification { resource: String, name: String },
    CreateLeafRecord {
        parent: String,
        content: Value,
        origin: Originator,
    },
}

impl RemoteCall {
    fn key(&self) -> String {
        match self {
            RemoteCall::CreateResource { parent, name } => format!("cnt:{parent}/{name}"),
            RemoteCall::CreateNotification { resource, name } => format!("sub:{resource}/{name}"),
            RemoteCall::CreateLeafRecord { parent, origin, .. } => {
                format!("cin:{origin:?}:{parent}")
            }
        }
    }
}

/// In-memory remote API that records every call in order.
///
/// Calls succeed with `Created` unless a response was scripted for their
/// target; scripted responses are consumed in order.
#[derive(Default)]
pub struct FakeRemoteApi {
    calls: Mutex<Vec<RemoteCall>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<RemoteOutcome, RemoteError>>>>,
    delay: Duration,
}

impl FakeRemoteApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn script_resource(&self, path: &str, response: Result<RemoteOutcome, RemoteError>) {
        self.script(format!("cnt:{path}"), response);
    }

    pub fn script_notification(&self, path: &str, response: Result<RemoteOutcome, RemoteError>) {
        self.script(format!("sub:{path}"), response);
    }

    pub fn script_record(
        &self,
        parent: &str,
        origin: Originator,
        response: Result<RemoteOutcome, RemoteError>,
    ) {
        self.script(format!("cin:{origin:?}:{parent}"), response);
    }

    fn script(&self, key: String, response: Result<RemoteOutcome, RemoteError>) {
        lock(&self.scripted).entry(key).or_default().push_back(response);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Paths of container creations, in call order.
    pub fn created_containers(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::CreateResource { parent, name } => Some(format!("{parent}/{name}")),
                _ => None,
            })
            .collect()
    }

    pub fn notification_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::CreateNotification { .. }))
            .count()
    }

    pub fn records(&self) -> Vec<(String, Value, Originator)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::CreateLeafRecord {
                    parent,
                    content,
                    origin,
                } => Some((parent, content, origin)),
                _ => None,
            })
            .collect()
    }

    async fn answer(&self, call: RemoteCall) -> Result<RemoteOutcome, RemoteError> {
        let key = call.key();
        lock(&self.calls).push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = lock(&self.scripted)
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or(Ok(RemoteOutcome::Created))
    }
}

#[async_trait]
impl RemoteResourceApi for FakeRemoteApi {
    async fn create_resource(
        &self,
        parent: &ResourcePath,
        name: &str,
    ) -> Result<RemoteOutcome, RemoteError> {
        self.answer(RemoteCall::CreateResource {
            parent: parent.to_string(),
            name: name.to_string(),
        })
        .await
    }

    async fn create_notification(
        &self,
        resource: &ResourcePath,
        spec: &NotificationSpec,
    ) -> Result<RemoteOutcome, RemoteError> {
        self.answer(RemoteCall::CreateNotification {
            resource: resource.to_string(),
            name: spec.resource_name.clone(),
        })
        .await
    }

    async fn create_leaf_record(
        &self,
        parent: &ResourcePath,
        content: &Value,
        origin: Originator,
    ) -> Result<RemoteOutcome, RemoteError> {
        self.answer(RemoteCall::CreateLeafRecord {
            parent: parent.to_string(),
            content: content.clone(),
            origin,
        })
        .await
    }
}

/// Publisher that keeps every message it was handed.
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Value)>>,
    connected: AtomicBool,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        lock(&self.published).clone()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .published()
            .into_iter()
            .map(|(topic, _)| topic)
            .collect();
        topics.sort();
        topics
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let value = serde_json::from_slice(&payload).unwrap_or(Value::Null);
        lock(&self.published).push((topic.to_string(), value));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Hands out queued snapshots, then reports a lost connection.
#[derive(Default)]
pub struct ScriptedSource {
    snapshots: Mutex<VecDeque<String>>,
}

impl ScriptedSource {
    pub fn new<I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().collect()),
        }
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn poll(&self) -> Result<String, TransportError> {
        lock(&self.snapshots)
            .pop_front()
            .ok_or(TransportError::Disconnected)
    }
}

/// Defaults with a fixed client id so configs compare equal.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.mqtt.client_id = "factorio_tas_test".to_string();
    config.rcon.poll_interval_ms = 10;
    config
}

/// `{"tick": tick, "targets": [{"label": c, "entities": [...]}, ...]}`
pub fn snapshot_json(tick: u64, groups: &[(&str, Vec<Value>)]) -> String {
    let targets: Vec<Value> = groups
        .iter()
        .map(|(category, entities)| json!({"label": category, "entities": entities}))
        .collect();
    json!({"tick": tick, "targets": targets}).to_string()
}

pub fn status_error(status: u16, rsc: Option<u32>) -> RemoteError {
    RemoteError::Status {
        url: "http://localhost:7599/Mobius/ae1".to_string(),
        status,
        rsc,
        debug: "scripted".to_string(),
    }
}
