use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::allow_list::AllowList;
use crate::layout::InboundTopic;
use crate::layout::TreeLayout;
use crate::metrics::BridgeStats;
use crate::metrics::Counter;
use crate::provision::HierarchyProvisioner;
use crate::remote::Originator;
use crate::remote::RemoteError;
use crate::remote::RemoteResourceApi;
use crate::snapshot::preview;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Stored,
    StoredViaFallback,
    /// Dropped before any remote call; carries the reason.
    Rejected(String),
    Failed,
}

/// Stores messages arriving on `<root>/<label>/<label>_<unit>` as data
/// records under the matching leaf resource.
pub struct InboundRelay {
    layout: TreeLayout,
    api: Arc<dyn RemoteResourceApi>,
    hierarchy: HierarchyProvisioner,
    allow: AllowList,
    stats: Arc<BridgeStats>,
}

impl InboundRelay {
    pub fn new(
        layout: TreeLayout,
        api: Arc<dyn RemoteResourceApi>,
        hierarchy: HierarchyProvisioner,
        allow: AllowList,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            layout,
            api,
            hierarchy,
            allow,
            stats,
        }
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> InboundOutcome {
        let target = match self.layout.parse_topic(topic) {
            Ok(target) => target,
            Err(err) => return self.reject(format!("invalid topic: {err}")),
        };
        let content: Value = match serde_json::from_slice(payload) {
            Ok(content) => content,
            Err(err) => {
                let raw = String::from_utf8_lossy(payload);
                return self.reject(format!("invalid JSON on {topic} ({err}): {}", preview(&raw)));
            }
        };

        match self
            .api
            .create_leaf_record(&target.path, &content, Originator::Primary)
            .await
        {
            Ok(_) => {
                self.stats.incr(Counter::InboundStored);
                debug!(path = %target.path, "stored record");
                InboundOutcome::Stored
            }
            Err(err) if err.is_access_denied() || err.is_not_found() => {
                self.store_via_fallback(&target, &content, &err).await
            }
            Err(err) => {
                self.stats.incr(Counter::InboundFailed);
                warn!(path = %target.path, "failed to store record: {err}");
                InboundOutcome::Failed
            }
        }
    }

    /// Best effort: re-creates the leaf's ancestors when allowed, then posts
    /// again with the fallback originator. Failures are only logged.
    async fn store_via_fallback(
        &self,
        target: &InboundTopic,
        content: &Value,
        cause: &RemoteError,
    ) -> InboundOutcome {
        info!(path = %target.path, "primary store rejected ({cause}); trying fallback");
        if self.allow.is_allowed(&target.label) {
            if let Err(err) = self
                .hierarchy
                .ensure_hierarchy(&target.label, &target.leaf)
                .await
            {
                warn!(path = %target.path, "fallback could not provision hierarchy: {err}");
            }
        } else {
            debug!(label = %target.label, "label not allowed; posting without provisioning");
        }

        match self
            .api
            .create_leaf_record(&target.path, content, Originator::Fallback)
            .await
        {
            Ok(_) => {
                self.stats.incr(Counter::InboundFallback);
                info!(path = %target.path, "stored record via fallback");
                InboundOutcome::StoredViaFallback
            }
            Err(err) => {
                self.stats.incr(Counter::InboundFailed);
                warn!(path = %target.path, "fallback store failed: {err}");
                InboundOutcome::Failed
            }
        }
    }

    fn reject(&self, reason: String) -> InboundOutcome {
        self.stats.incr(Counter::InboundRejected);
        warn!("dropping inbound message: {reason}");
        InboundOutcome::Rejected(reason)
    }
}
