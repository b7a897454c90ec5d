use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::NotificationSpec;
use super::Originator;
use super::RSC_CONFLICT;
use super::RemoteError;
use super::RemoteOutcome;
use super::RemoteResourceApi;
use crate::config::RemoteConfig;
use crate::layout::ResourcePath;

const HEADER_ORIGIN: &str = "X-M2M-Origin";
const HEADER_REQUEST_ID: &str = "X-M2M-RI";
const HEADER_RSC: &str = "X-M2M-RSC";

#[derive(Debug, Clone, Copy)]
enum ResourceType {
    Container = 3,
    ContentInstance = 4,
    Subscription = 23,
}

impl ResourceType {
    fn request_prefix(self) -> &'static str {
        match self {
            ResourceType::Container => "cnt",
            ResourceType::ContentInstance => "cin",
            ResourceType::Subscription => "sub",
        }
    }
}

/// oneM2M HTTP binding against a Mobius CSE.
#[derive(Debug, Clone)]
pub struct OneM2mClient {
    client: Client,
    base_url: String,
    origin: String,
    fallback_origin: String,
}

impl OneM2mClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &RemoteConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            origin: config.origin.clone(),
            fallback_origin: config.fallback_origin.clone(),
        }
    }

    async fn post(
        &self,
        parent: &ResourcePath,
        ty: ResourceType,
        body: &Value,
        origin: &str,
    ) -> Result<RemoteOutcome, RemoteError> {
        let url = format!("{}{}", self.base_url, parent);
        let request_id = format!("{}-{}", ty.request_prefix(), Uuid::new_v4().simple());
        let payload = serde_json::to_vec(body).map_err(|err| RemoteError::Transport {
            url: url.clone(),
            message: err.to_string(),
        })?;

        let response = self
            .client
            .post(&url)
            .header(HEADER_ORIGIN, origin)
            .header(HEADER_REQUEST_ID, &request_id)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, format!("application/json;ty={}", ty as u8))
            .body(payload)
            .send()
            .await
            .map_err(|err| RemoteError::Transport {
                url: url.clone(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let rsc = response
            .headers()
            .get(HEADER_RSC)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u32>().ok());
        debug!(%url, %status, ?rsc, %request_id, "oneM2M create answered");

        if status.is_success() {
            return Ok(RemoteOutcome::Created);
        }
        if status == StatusCode::CONFLICT || rsc == Some(RSC_CONFLICT) {
            return Ok(RemoteOutcome::AlreadyExists);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            url,
            status: status.as_u16(),
            rsc,
            debug: debug_text(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_default(),
        })
    }
}

/// Pulls `m2m:dbg` out of an error body, falling back to the raw text.
fn debug_text(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => match value.get("m2m:dbg") {
            Some(Value::String(dbg)) => Some(dbg.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(trimmed.to_string()),
        },
        Err(_) => Some(trimmed.to_string()),
    }
}

#[async_trait]
impl RemoteResourceApi for OneM2mClient {
    async fn create_resource(
        &self,
        parent: &ResourcePath,
        name: &str,
    ) -> Result<RemoteOutcome, RemoteError> {
        let body = json!({ "m2m:cnt": { "rn": name } });
        self.post(parent, ResourceType::Container, &body, &self.origin)
            .await
    }

    async fn create_notification(
        &self,
        resource: &ResourcePath,
        spec: &NotificationSpec,
    ) -> Result<RemoteOutcome, RemoteError> {
        let body = json!({
            "m2m:sub": {
                "rn": spec.resource_name,
                "enc": { "net": spec.event_types },
                "nu": [spec.receiver_uri],
                "nct": spec.content_type,
            }
        });
        self.post(resource, ResourceType::Subscription, &body, &self.origin)
            .await
    }

    async fn create_leaf_record(
        &self,
        parent: &ResourcePath,
        content: &Value,
        origin: Originator,
    ) -> Result<RemoteOutcome, RemoteError> {
        let origin = match origin {
            Originator::Primary => &self.origin,
            Originator::Fallback => &self.fallback_origin,
        };
        let body = json!({ "m2m:cin": { "con": content } });
        self.post(parent, ResourceType::ContentInstance, &body, origin)
            .await
    }
}
