use std::sync::Arc;
use tracing::info;

use super::ProvisionError;
use super::cache::ResourcePathCache;
use crate::allow_list::AllowList;
use crate::layout::ResourcePath;
use crate::layout::TreeLayout;
use crate::layout::label_of_unit_name;
use crate::metrics::BridgeStats;
use crate::metrics::Counter;
use crate::remote::RemoteOutcome;
use crate::remote::RemoteResourceApi;

/// Makes sure `<root>/<container>/<label>/<leaf>` exists, ancestors first.
#[derive(Clone)]
pub struct HierarchyProvisioner {
    api: Arc<dyn RemoteResourceApi>,
    cache: ResourcePathCache,
    layout: TreeLayout,
    allow: AllowList,
    stats: Arc<BridgeStats>,
}

impl HierarchyProvisioner {
    pub fn new(
        api: Arc<dyn RemoteResourceApi>,
        cache: ResourcePathCache,
        layout: TreeLayout,
        allow: AllowList,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            api,
            cache,
            layout,
            allow,
            stats,
        }
    }

    pub fn cache(&self) -> &ResourcePathCache {
        &self.cache
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// Ensures the bridge root, the label branch and the leaf, in that order,
    /// and returns the leaf path.
    pub async fn ensure_hierarchy(
        &self,
        label: &str,
        leaf: &str,
    ) -> Result<ResourcePath, ProvisionError> {
        self.ensure_container(self.layout.app_root(), self.layout.container())
            .await?;
        let label_path = self
            .ensure_container(self.layout.bridge_root(), label)
            .await?;
        self.ensure_container(&label_path, leaf).await
    }

    /// Ensures `name` exists under `parent`.
    ///
    /// A unit-qualified name such as `boilers_12` requested directly under the
    /// bridge root is moved under its label branch when that label is
    /// allowed, so the tree never gets flattened.
    pub async fn ensure_container(
        &self,
        parent: &ResourcePath,
        name: &str,
    ) -> Result<ResourcePath, ProvisionError> {
        if parent == self.layout.bridge_root() {
            let misplaced = label_of_unit_name(name).filter(|label| self.allow.is_allowed(label));
            if let Some(label) = misplaced {
                let label_path = self.ensure_one(self.layout.bridge_root(), label).await?;
                return self.ensure_one(&label_path, name).await;
            }
        }
        self.ensure_one(parent, name).await
    }

    async fn ensure_one(
        &self,
        parent: &ResourcePath,
        name: &str,
    ) -> Result<ResourcePath, ProvisionError> {
        let path = parent.child(name);
        let api = Arc::clone(&self.api);
        let stats = Arc::clone(&self.stats);
        let parent = parent.clone();
        let name = name.to_string();
        let created = path.clone();
        self.cache
            .get_or_create(&path, move || async move {
                match api.create_resource(&parent, &name).await? {
                    RemoteOutcome::Created => {
                        stats.incr(Counter::ResourcesCreated);
                        info!(path = %created, "created container");
                    }
                    RemoteOutcome::AlreadyExists => {
                        stats.incr(Counter::ResourcesExisting);
                        info!(path = %created, "container already exists");
                    }
                }
                Ok(())
            })
            .await
            .map_err(|source| ProvisionError::Remote {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
