use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use tracing::warn;

use crate::allow_list::AllowList;
use crate::label::LabelDeriver;
use crate::layout::leaf_name;
use crate::metrics::BridgeStats;
use crate::metrics::Counter;
use crate::provision::HierarchyProvisioner;
use crate::provision::NotificationProvisioner;
use crate::relay::payload::build_payload;
use crate::snapshot::Snapshot;
use crate::snapshot::SnapshotError;
use crate::snapshot::decode_snapshot;
use crate::snapshot::entity_unit;
use crate::transport::Publisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityOutcome {
    Published,
    Filtered,
    Malformed,
    ProvisionFailed,
    PublishFailed,
}

/// Per-snapshot tally of what happened to each entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub tick: Option<u64>,
    pub published: usize,
    pub filtered: usize,
    pub malformed: usize,
    pub provision_failed: usize,
    pub publish_failed: usize,
}

impl RelayReport {
    fn record(&mut self, outcome: EntityOutcome) {
        match outcome {
            EntityOutcome::Published => self.published += 1,
            EntityOutcome::Filtered => self.filtered += 1,
            EntityOutcome::Malformed => self.malformed += 1,
            EntityOutcome::ProvisionFailed => self.provision_failed += 1,
            EntityOutcome::PublishFailed => self.publish_failed += 1,
        }
    }
}

/// Drives label derivation, provisioning and publishing for every entity of
/// a snapshot. Entities are independent: one failing never affects another.
pub struct SnapshotRelay {
    deriver: LabelDeriver,
    allow: AllowList,
    hierarchy: HierarchyProvisioner,
    notifications: NotificationProvisioner,
    publisher: Arc<dyn Publisher>,
    stats: Arc<BridgeStats>,
    concurrency: usize,
}

impl SnapshotRelay {
    pub fn new(
        deriver: LabelDeriver,
        allow: AllowList,
        hierarchy: HierarchyProvisioner,
        notifications: NotificationProvisioner,
        publisher: Arc<dyn Publisher>,
        stats: Arc<BridgeStats>,
        concurrency: usize,
    ) -> Self {
        Self {
            deriver,
            allow,
            hierarchy,
            notifications,
            publisher,
            stats,
            concurrency: concurrency.max(1),
        }
    }

    /// Decodes and relays one raw snapshot. A snapshot that does not decode
    /// is dropped as a whole before anything is provisioned.
    pub async fn relay_raw(&self, raw: &str) -> Result<RelayReport, SnapshotError> {
        match decode_snapshot(raw) {
            Ok(snapshot) => Ok(self.relay(snapshot).await),
            Err(err) => {
                self.stats.incr(Counter::SnapshotsRejected);
                warn!("dropping snapshot: {err}");
                Err(err)
            }
        }
    }

    pub async fn relay(&self, snapshot: Snapshot) -> RelayReport {
        let tick = snapshot.tick;
        let entities = snapshot.groups.into_iter().flat_map(|group| {
            let category = group.category;
            group
                .entities
                .into_iter()
                .map(move |entity| (category.clone(), entity))
        });

        let outcomes: Vec<EntityOutcome> = stream::iter(entities)
            .map(|(category, entity)| self.relay_entity(tick, category, entity))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RelayReport {
            tick,
            ..RelayReport::default()
        };
        for outcome in outcomes {
            report.record(outcome);
        }
        self.stats.incr(Counter::SnapshotsRelayed);
        debug!(?report, "relayed snapshot");
        report
    }

    async fn relay_entity(
        &self,
        tick: Option<u64>,
        category: Option<String>,
        entity: Value,
    ) -> EntityOutcome {
        let Value::Object(fields) = entity else {
            self.stats.incr(Counter::EntitiesMalformed);
            warn!(?category, "skipping malformed entity: not a JSON object");
            return EntityOutcome::Malformed;
        };

        let derived = self.deriver.derive(category.as_deref(), &fields);
        if !self.allow.is_allowed(&derived.label) {
            self.stats.incr(Counter::EntitiesFiltered);
            debug!(label = %derived.label, "label not allowed");
            return EntityOutcome::Filtered;
        }

        let unit = match entity_unit(&fields) {
            Ok(unit) => unit,
            Err(err) => {
                self.stats.incr(Counter::EntitiesMalformed);
                warn!(label = %derived.label, "skipping malformed entity: {err}");
                return EntityOutcome::Malformed;
            }
        };
        let leaf = leaf_name(&derived.label, &unit);

        let leaf_path = match self.hierarchy.ensure_hierarchy(&derived.label, &leaf).await {
            Ok(path) => path,
            Err(err) => {
                self.stats.incr(Counter::EntitiesFailed);
                warn!(%leaf, "skipping entity: {err}");
                return EntityOutcome::ProvisionFailed;
            }
        };
        self.notifications.ensure_notification(&leaf_path).await;

        let payload = build_payload(tick, &derived, &fields);
        let topic = leaf_path.as_str();
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.stats.incr(Counter::EntitiesFailed);
                warn!(%topic, "failed to encode payload: {err}");
                return EntityOutcome::PublishFailed;
            }
        };
        match self.publisher.publish(topic, bytes).await {
            Ok(()) => {
                self.stats.incr(Counter::EntitiesPublished);
                debug!(%topic, "published");
                EntityOutcome::Published
            }
            Err(err) => {
                self.stats.incr(Counter::EntitiesFailed);
                warn!(%topic, "publish failed: {err}");
                EntityOutcome::PublishFailed
            }
        }
    }
}
