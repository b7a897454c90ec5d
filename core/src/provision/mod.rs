//! Idempotent provisioning of the remote resource tree.

pub mod cache;
mod hierarchy;
mod notification;

pub use cache::ProvisioningState;
pub use cache::ResourcePathCache;
pub use hierarchy::HierarchyProvisioner;
pub use notification::NotificationProvisioner;
pub use notification::NotificationStatus;

use thiserror::Error;

use crate::layout::ResourcePath;
use crate::remote::RemoteError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("failed to provision {path}: {source}")]
    Remote {
        path: ResourcePath,
        #[source]
        source: RemoteError,
    },
}
