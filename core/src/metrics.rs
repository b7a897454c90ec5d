use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Process-wide counters. Cheap to bump from any task.
#[derive(Debug, Default)]
pub struct BridgeStats {
    snapshots_relayed: AtomicU64,
    snapshots_rejected: AtomicU64,
    entities_published: AtomicU64,
    entities_filtered: AtomicU64,
    entities_malformed: AtomicU64,
    entities_failed: AtomicU64,
    resources_created: AtomicU64,
    resources_existing: AtomicU64,
    notifications_registered: AtomicU64,
    notifications_failed: AtomicU64,
    inbound_stored: AtomicU64,
    inbound_fallback: AtomicU64,
    inbound_rejected: AtomicU64,
    inbound_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    SnapshotsRelayed,
    SnapshotsRejected,
    EntitiesPublished,
    EntitiesFiltered,
    EntitiesMalformed,
    EntitiesFailed,
    ResourcesCreated,
    ResourcesExisting,
    NotificationsRegistered,
    NotificationsFailed,
    InboundStored,
    InboundFallback,
    InboundRejected,
    InboundFailed,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::SnapshotsRelayed => &self.snapshots_relayed,
            Counter::SnapshotsRejected => &self.snapshots_rejected,
            Counter::EntitiesPublished => &self.entities_published,
            Counter::EntitiesFiltered => &self.entities_filtered,
            Counter::EntitiesMalformed => &self.entities_malformed,
            Counter::EntitiesFailed => &self.entities_failed,
            Counter::ResourcesCreated => &self.resources_created,
            Counter::ResourcesExisting => &self.resources_existing,
            Counter::NotificationsRegistered => &self.notifications_registered,
            Counter::NotificationsFailed => &self.notifications_failed,
            Counter::InboundStored => &self.inbound_stored,
            Counter::InboundFallback => &self.inbound_fallback,
            Counter::InboundRejected => &self.inbound_rejected,
            Counter::InboundFailed => &self.inbound_failed,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.counter(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            taken_at: Utc::now(),
            snapshots_relayed: self.get(Counter::SnapshotsRelayed),
            snapshots_rejected: self.get(Counter::SnapshotsRejected),
            entities_published: self.get(Counter::EntitiesPublished),
            entities_filtered: self.get(Counter::EntitiesFiltered),
            entities_malformed: self.get(Counter::EntitiesMalformed),
            entities_failed: self.get(Counter::EntitiesFailed),
            resources_created: self.get(Counter::ResourcesCreated),
            resources_existing: self.get(Counter::ResourcesExisting),
            notifications_registered: self.get(Counter::NotificationsRegistered),
            notifications_failed: self.get(Counter::NotificationsFailed),
            inbound_stored: self.get(Counter::InboundStored),
            inbound_fallback: self.get(Counter::InboundFallback),
            inbound_rejected: self.get(Counter::InboundRejected),
            inbound_failed: self.get(Counter::InboundFailed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub snapshots_relayed: u64,
    pub snapshots_rejected: u64,
    pub entities_published: u64,
    pub entities_filtered: u64,
    pub entities_malformed: u64,
    pub entities_failed: u64,
    pub resources_created: u64,
    pub resources_existing: u64,
    pub notifications_registered: u64,
    pub notifications_failed: u64,
    pub inbound_stored: u64,
    pub inbound_fallback: u64,
    pub inbound_rejected: u64,
    pub inbound_failed: u64,
}

/// Hit/miss counters of the resource path cache.
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub joined: u64,
    pub confirmed: usize,
    pub pending: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f32 {
        let total = self.hits + self.misses + self.joined;
        if total == 0 {
            return 1.0;
        }
        self.hits as f32 / total as f32
    }
}
