//! Wires the provisioners and relays together and runs the poll and inbound
//! loops until shutdown.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::allow_list::AllowList;
use crate::config::BridgeConfig;
use crate::config::ConfigError;
use crate::label::LabelDeriver;
use crate::layout::TreeLayout;
use crate::metrics::BridgeStats;
use crate::metrics::StatsSnapshot;
use crate::provision::HierarchyProvisioner;
use crate::provision::NotificationProvisioner;
use crate::provision::ResourcePathCache;
use crate::relay::InboundOutcome;
use crate::relay::InboundRelay;
use crate::relay::RelayReport;
use crate::relay::SnapshotRelay;
use crate::remote::NotificationSpec;
use crate::remote::RemoteResourceApi;
use crate::snapshot::SnapshotError;
use crate::transport::InboundMessage;
use crate::transport::Publisher;
use crate::transport::SnapshotSource;
use crate::transport::TransportError;

pub struct Bridge {
    config: BridgeConfig,
    layout: TreeLayout,
    cache: ResourcePathCache,
    stats: Arc<BridgeStats>,
    relay: Arc<SnapshotRelay>,
    inbound: Arc<InboundRelay>,
}

impl Bridge {
    /// Builds the shared cache, provisioners and relays on top of the given
    /// remote API and publisher.
    pub fn new(
        config: BridgeConfig,
        api: Arc<dyn RemoteResourceApi>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, ConfigError> {
        let layout = config.layout()?;
        let stats = Arc::new(BridgeStats::new());
        let cache = ResourcePathCache::new();
        let allow = AllowList::new(&config.labels);

        let hierarchy = HierarchyProvisioner::new(
            Arc::clone(&api),
            cache.clone(),
            layout.clone(),
            allow.clone(),
            Arc::clone(&stats),
        );
        let notifications = NotificationProvisioner::new(
            Arc::clone(&api),
            NotificationSpec::on_child_created(
                config.notification.resource_name.clone(),
                config.notification.receiver_uri(),
            ),
            Arc::clone(&stats),
        );
        let relay = SnapshotRelay::new(
            LabelDeriver::new(&config.labels),
            allow.clone(),
            hierarchy.clone(),
            notifications,
            publisher,
            Arc::clone(&stats),
            config.relay.concurrency,
        );
        let inbound = InboundRelay::new(layout.clone(), api, hierarchy, allow, Arc::clone(&stats));

        Ok(Self {
            config,
            layout,
            cache,
            stats,
            relay: Arc::new(relay),
            inbound: Arc::new(inbound),
        })
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    pub fn cache(&self) -> &ResourcePathCache {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn relay_once(&self, raw: &str) -> Result<RelayReport, SnapshotError> {
        self.relay.relay_raw(raw).await
    }

    pub async fn handle_inbound(&self, message: &InboundMessage) -> InboundOutcome {
        self.inbound.handle(&message.topic, &message.payload).await
    }

    /// Polls `source` every poll interval and stores every inbound message
    /// until `shutdown` flips to true or its sender goes away.
    ///
    /// Each poll and each message runs on its own task, so a slow poll
    /// overlaps the next one instead of delaying it.
    pub async fn run(
        &self,
        source: Arc<dyn SnapshotSource>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut poll = tokio::time::interval(self.config.rcon.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stats_every = self.config.relay.stats_interval();
        let mut stats = tokio::time::interval_at(Instant::now() + stats_every, stats_every);
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut inbound_open = true;

        info!(
            root = %self.layout.bridge_root(),
            interval = ?self.config.rcon.poll_interval(),
            "bridge running"
        );
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = poll.tick() => {
                    let source = Arc::clone(&source);
                    let relay = Arc::clone(&self.relay);
                    tasks.spawn(poll_and_relay(source, relay));
                }
                message = inbound.recv(), if inbound_open => match message {
                    Some(message) => {
                        let relay = Arc::clone(&self.inbound);
                        tasks.spawn(async move {
                            relay.handle(&message.topic, &message.payload).await;
                        });
                    }
                    None => {
                        debug!("inbound channel closed");
                        inbound_open = false;
                    }
                },
                _ = stats.tick() => self.log_stats(),
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            error!("relay task panicked: {err}");
                        }
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "bridge stopping");
        tasks.shutdown().await;
        self.log_stats();
    }

    fn log_stats(&self) {
        let stats = self.stats.snapshot();
        let cache = self.cache.stats();
        info!(
            snapshots = stats.snapshots_relayed,
            rejected = stats.snapshots_rejected,
            published = stats.entities_published,
            filtered = stats.entities_filtered,
            failed = stats.entities_failed,
            created = stats.resources_created,
            inbound = stats.inbound_stored + stats.inbound_fallback,
            confirmed_paths = cache.confirmed,
            cache_hit_ratio = cache.hit_ratio(),
            "bridge stats"
        );
    }
}

async fn poll_and_relay(source: Arc<dyn SnapshotSource>, relay: Arc<SnapshotRelay>) {
    match source.poll().await {
        // Decode failures are logged by the relay.
        Ok(raw) => {
            let _ = relay.relay_raw(&raw).await;
        }
        Err(err @ TransportError::Backoff(_)) => debug!("poll skipped: {err}"),
        Err(err) => warn!("poll failed: {err}"),
    }
}
