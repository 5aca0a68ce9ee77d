//! # doge-catalog
//!
//! The catalog of known Dogecoin peers.
//!
//! This crate provides:
//! - [`PeerRecord`] with a closed [`PeerStatus`] lifecycle
//! - [`PeerCatalog`], a deduplicated, capacity-bounded map with manual-update
//!   protection, offline sweeps and cleanup
//! - Snapshot stores for persisting the catalog between runs
//!
//! ## Lifecycle
//!
//! - `Discovered`: first sighting (DNS seed, fallback list, addr gossip)
//! - `Online`: completed a handshake
//! - `Offline`: silent for longer than the offline threshold
//!
//! Records silent for longer than the removal threshold are deleted by cleanup.

mod catalog;
mod error;
mod record;
mod store;

pub use catalog::{
    CatalogConfig, CatalogEvent, CatalogListener, CleanupReport, PeerCatalog, UpdateOutcome,
    MAX_PEERS, OFFLINE_THRESHOLD, REMOVAL_THRESHOLD,
};
pub use error::{CatalogError, CatalogResult};
pub use record::{now_millis, PeerRecord, PeerSource, PeerStatus};
pub use store::{JsonFileStore, MemoryStore, SnapshotStore, SNAPSHOT_FILE};
