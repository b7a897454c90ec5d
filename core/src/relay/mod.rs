//! The two data paths: snapshots out to the broker, broker messages into
//! the resource tree.

mod inbound;
mod payload;
mod snapshot_relay;

pub use inbound::InboundOutcome;
pub use inbound::InboundRelay;
pub use payload::build_payload;
pub use snapshot_relay::RelayReport;
pub use snapshot_relay::SnapshotRelay;
