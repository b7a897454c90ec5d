use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::info;
use tracing::warn;

use crate::layout::ResourcePath;
use crate::metrics::BridgeStats;
use crate::metrics::Counter;
use crate::remote::NotificationSpec;
use crate::remote::RemoteOutcome;
use crate::remote::RemoteResourceApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    /// Registered earlier in this process; no remote call was made.
    AlreadyEnsured,
    Registered,
    AlreadyExisted,
    /// Logged and dropped; the leaf stays usable.
    Failed,
}

/// Registers one change notification per leaf resource.
///
/// Duplicate concurrent registrations are tolerated: the remote answers the
/// second one with a conflict.
#[derive(Clone)]
pub struct NotificationProvisioner {
    api: Arc<dyn RemoteResourceApi>,
    spec: NotificationSpec,
    ensured: Arc<Mutex<HashSet<ResourcePath>>>,
    stats: Arc<BridgeStats>,
}

impl NotificationProvisioner {
    pub fn new(
        api: Arc<dyn RemoteResourceApi>,
        spec: NotificationSpec,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            api,
            spec,
            ensured: Arc::new(Mutex::new(HashSet::new())),
            stats,
        }
    }

    pub fn is_ensured(&self, leaf: &ResourcePath) -> bool {
        self.ensured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&leaf.child(&self.spec.resource_name))
    }

    pub async fn ensure_notification(&self, leaf: &ResourcePath) -> NotificationStatus {
        let key = leaf.child(&self.spec.resource_name);
        if self
            .ensured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
        {
            return NotificationStatus::AlreadyEnsured;
        }

        let status = match self.api.create_notification(leaf, &self.spec).await {
            Ok(RemoteOutcome::Created) => {
                info!(resource = %leaf, name = %self.spec.resource_name, "registered notification");
                NotificationStatus::Registered
            }
            Ok(RemoteOutcome::AlreadyExists) => {
                info!(
                    resource = %leaf,
                    name = %self.spec.resource_name,
                    "notification already registered"
                );
                NotificationStatus::AlreadyExisted
            }
            Err(err) => {
                self.stats.incr(Counter::NotificationsFailed);
                warn!(resource = %leaf, "failed to register notification: {err}");
                return NotificationStatus::Failed;
            }
        };
        self.stats.incr(Counter::NotificationsRegistered);
        self.ensured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        status
    }
}
