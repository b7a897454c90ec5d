//! Relays Factorio device snapshots into a oneM2M resource tree and mirrors
//! broker messages back into it as data records.

pub mod allow_list;
pub mod bridge;
pub mod config;
pub mod label;
pub mod layout;
pub mod metrics;
pub mod provision;
pub mod relay;
pub mod remote;
pub mod snapshot;
pub mod transport;

pub use bridge::Bridge;
pub use config::BridgeConfig;
