//! The remote resource tree the bridge provisions into.

mod onem2m;

pub use onem2m::OneM2mClient;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::layout::ResourcePath;

/// oneM2M response status code for "resource already exists".
pub const RSC_CONFLICT: u32 = 4105;
/// oneM2M response status code for "access denied".
pub const RSC_ACCESS_DENIED: u32 = 4103;
/// oneM2M response status code for "not found".
pub const RSC_NOT_FOUND: u32 = 4004;

/// Successful answers to a create call. A conflict is a success: the
/// resource existing is the state the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered {status} (rsc {rsc:?}): {debug}")]
    Status {
        url: String,
        status: u16,
        rsc: Option<u32>,
        debug: String,
    },
}

impl RemoteError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, RemoteError::Status { status, rsc, .. }
            if *rsc == Some(RSC_ACCESS_DENIED) || (rsc.is_none() && *status == 403))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Status { status, rsc, .. }
            if *rsc == Some(RSC_NOT_FOUND) || (rsc.is_none() && *status == 404))
    }
}

/// Which originator a content record is posted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Originator {
    Primary,
    /// Elevated originator used only by the inbound fallback path.
    Fallback,
}

/// A change-notification registration on a leaf resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSpec {
    pub resource_name: String,
    pub receiver_uri: String,
    pub event_types: Vec<u8>,
    pub content_type: u8,
}

impl NotificationSpec {
    /// Notify on creation of direct children, with the whole resource as content.
    pub fn on_child_created(
        resource_name: impl Into<String>,
        receiver_uri: impl Into<String>,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            receiver_uri: receiver_uri.into(),
            event_types: vec![3],
            content_type: 2,
        }
    }
}

#[async_trait]
pub trait RemoteResourceApi: Send + Sync {
    /// Creates container `name` under `parent`.
    async fn create_resource(
        &self,
        parent: &ResourcePath,
        name: &str,
    ) -> Result<RemoteOutcome, RemoteError>;

    async fn create_notification(
        &self,
        resource: &ResourcePath,
        spec: &NotificationSpec,
    ) -> Result<RemoteOutcome, RemoteError>;

    /// Stores `content` as a new data record under `parent`.
    async fn create_leaf_record(
        &self,
        parent: &ResourcePath,
        content: &Value,
        origin: Originator,
    ) -> Result<RemoteOutcome, RemoteError>;
}
