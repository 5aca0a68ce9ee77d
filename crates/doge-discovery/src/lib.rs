//! # doge-discovery
//!
//! Peer discovery for the Dogecoin P2P network.
//!
//! This crate provides:
//! - A bounded worker pool for socket-bound handshakes
//! - The snowball amplifier, which widens the catalog through peer gossip
//! - The discovery orchestrator: seeding, handshaking, snowballing and
//!   periodic health checks, with observers fed from a single ordered stream

mod backoff;
mod error;
mod events;
mod pool;
mod prober;
mod service;
mod snowball;

pub use backoff::Backoff;
pub use error::{DiscoveryError, DiscoveryResult};
pub use events::{DiscoveryEvent, DiscoveryObserver};
pub use pool::{PoolConfig, WorkerPool};
pub use prober::{online_record, probe_batch, record_handshake, AddressProber, ProbeResults};
pub use service::{CycleReport, DiscoveryConfig, DiscoveryPhase, DiscoveryService};
pub use snowball::{SnowballAmplifier, SnowballConfig, SnowballReport};
