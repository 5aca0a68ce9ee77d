//! The peer catalog.
//!
//! An in-memory map from canonical address key to [`PeerRecord`], bounded at
//! `max_peers`. All mutation goes through this type; after each one the whole map
//! is written to the [`SnapshotStore`] and the registered [`CatalogListener`]
//! hears about it. The map is the source of truth: a failed snapshot write is
//! logged and the catalog carries on.

use crate::store::{MemoryStore, SnapshotStore};
use crate::{now_millis, PeerRecord, PeerSource, PeerStatus};
use doge_network::{Host, NodeAddress};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum number of records kept.
pub const MAX_PEERS: usize = 1000;

/// Silence after which a peer is marked offline.
pub const OFFLINE_THRESHOLD: Duration = Duration::from_secs(48 * 3600);

/// Silence after which a peer is forgotten.
pub const REMOVAL_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 3600);

/// Catalog configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Capacity; inserting beyond it evicts the stalest record.
    pub max_peers: usize,
    /// Silence before a record turns Offline.
    pub offline_threshold: Duration,
    /// Silence before a record is deleted by cleanup.
    pub removal_threshold: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_peers: MAX_PEERS,
            offline_threshold: OFFLINE_THRESHOLD,
            removal_threshold: REMOVAL_THRESHOLD,
        }
    }
}

/// Change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    /// A record was inserted or changed.
    PeerUpdated(PeerRecord),
    /// The number of records changed.
    CountChanged(usize),
}

/// Receives [`CatalogEvent`]s in mutation order.
///
/// Called with the catalog's write lock held: implementations must not block
/// and must not call back into the catalog.
pub trait CatalogListener: Send + Sync {
    fn on_event(&self, event: CatalogEvent);
}

/// What `add_or_update` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New key; `evicted` names the record pushed out to make room.
    Inserted { evicted: Option<String> },
    /// Existing record merged.
    Updated,
    /// Existing record is manually updated and the incoming one is not.
    Protected,
}

/// Counts from a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub marked_offline: usize,
    pub removed: usize,
}

/// Deduplicated, persisted, capacity-bounded peer store.
pub struct PeerCatalog {
    config: CatalogConfig,
    peers: RwLock<HashMap<String, PeerRecord>>,
    store: Box<dyn SnapshotStore>,
    listener: RwLock<Option<Arc<dyn CatalogListener>>>,
}

impl PeerCatalog {
    /// Open a catalog, loading whatever snapshot `store` holds.
    ///
    /// Loaded records get `last_seen` refreshed to now so a long shutdown does
    /// not turn every peer offline at the first sweep. An unreadable snapshot is
    /// logged and the catalog starts empty.
    pub fn open(config: CatalogConfig, store: Box<dyn SnapshotStore>) -> Self {
        let peers = match store.load() {
            Ok(Some(snapshot)) => Self::restore(&config, snapshot, now_millis()),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load peer snapshot, starting empty");
                HashMap::new()
            }
        };
        if !peers.is_empty() {
            info!(count = peers.len(), "Restored peer catalog");
        }

        Self {
            config,
            peers: RwLock::new(peers),
            store,
            listener: RwLock::new(None),
        }
    }

    /// A catalog that only snapshots to memory.
    pub fn in_memory(config: CatalogConfig) -> Self {
        Self::open(config, Box::new(MemoryStore::new()))
    }

    /// Re-key, cap and refresh a loaded snapshot.
    fn restore(
        config: &CatalogConfig,
        snapshot: HashMap<String, PeerRecord>,
        now: u64,
    ) -> HashMap<String, PeerRecord> {
        let mut records: Vec<PeerRecord> = snapshot.into_values().collect();
        // Freshest first, so truncation drops the stalest
        records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        let mut peers = HashMap::with_capacity(records.len().min(config.max_peers));
        for mut record in records {
            if peers.len() >= config.max_peers {
                break;
            }
            record.last_seen = now;
            peers.entry(record.key()).or_insert(record);
        }
        peers
    }

    /// Register the change listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn CatalogListener>) {
        *self.listener.write() = Some(listener);
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Insert or merge a record.
    ///
    /// A manually updated record only accepts incoming records that are manual
    /// too. Otherwise incoming fields win, except that the earliest
    /// `first_discovered` and the latest handshake attempt are kept.
    pub fn add_or_update(&self, record: PeerRecord) -> UpdateOutcome {
        let mut peers = self.peers.write();
        self.upsert(&mut peers, record)
    }

    fn upsert(&self, peers: &mut HashMap<String, PeerRecord>, record: PeerRecord) -> UpdateOutcome {
        let key = record.key();
        let outcome = match peers.get_mut(&key) {
            Some(existing) => {
                if existing.manually_updated && !record.manually_updated {
                    debug!(peer = %key, "Skipping update of manually updated peer");
                    return UpdateOutcome::Protected;
                }
                let first_discovered = existing.first_discovered.min(record.first_discovered);
                let last_attempt = existing.last_handshake_attempt.max(record.last_handshake_attempt);
                *existing = record;
                existing.first_discovered = first_discovered;
                existing.last_handshake_attempt = last_attempt;
                UpdateOutcome::Updated
            }
            None => {
                let evicted = if peers.len() >= self.config.max_peers {
                    Self::evict_stalest(peers)
                } else {
                    None
                };
                if let Some(ref gone) = evicted {
                    debug!(evicted = %gone, "Catalog full, evicted stalest peer");
                }
                peers.insert(key.clone(), record);
                UpdateOutcome::Inserted { evicted }
            }
        };

        if let Some(updated) = peers.get(&key) {
            self.emit(CatalogEvent::PeerUpdated(updated.clone()));
        }
        if matches!(outcome, UpdateOutcome::Inserted { evicted: None }) {
            self.emit(CatalogEvent::CountChanged(peers.len()));
        }
        self.persist(peers);
        outcome
    }

    /// Insert a Discovered record for `address` unless the key is already known.
    ///
    /// Returns true if a record was created. The check and the insert happen
    /// under one write lock.
    pub fn register_discovered(&self, address: &NodeAddress, source: PeerSource) -> bool {
        let mut peers = self.peers.write();
        if peers.contains_key(&address.key()) {
            return false;
        }
        let record = PeerRecord::discovered(address.clone(), source, now_millis());
        matches!(self.upsert(&mut peers, record), UpdateOutcome::Inserted { .. })
    }

    /// Stamp a handshake attempt on an existing record.
    pub fn mark_attempt(&self, address: &NodeAddress) {
        self.mark_attempt_at(address, now_millis());
    }

    pub fn mark_attempt_at(&self, address: &NodeAddress, now: u64) {
        let mut peers = self.peers.write();
        if let Some(record) = peers.get_mut(&address.key()) {
            record.last_handshake_attempt = Some(now);
            let updated = record.clone();
            self.emit(CatalogEvent::PeerUpdated(updated));
            self.persist(&peers);
        }
    }

    /// Mark records silent for longer than the offline threshold as Offline.
    ///
    /// Returns how many records changed. Never deletes.
    pub fn status_sweep(&self) -> usize {
        self.status_sweep_at(now_millis())
    }

    pub fn status_sweep_at(&self, now: u64) -> usize {
        let mut peers = self.peers.write();
        let changed = self.sweep_locked(&mut peers, now);
        if changed > 0 {
            info!(count = changed, "Marked silent peers offline");
            self.persist(&peers);
        }
        changed
    }

    /// Sweep, then delete records silent for longer than the removal threshold.
    pub fn cleanup(&self) -> CleanupReport {
        self.cleanup_at(now_millis())
    }

    pub fn cleanup_at(&self, now: u64) -> CleanupReport {
        let mut peers = self.peers.write();
        let marked_offline = self.sweep_locked(&mut peers, now);

        let limit = self.config.removal_threshold.as_millis() as u64;
        let before = peers.len();
        peers.retain(|_, record| record.silence(now) <= limit);
        let removed = before - peers.len();

        if removed > 0 {
            info!(removed, remaining = peers.len(), "Removed stale peers");
            self.emit(CatalogEvent::CountChanged(peers.len()));
        }
        if marked_offline > 0 || removed > 0 {
            self.persist(&peers);
        }

        CleanupReport {
            marked_offline,
            removed,
        }
    }

    /// Drop every record.
    pub fn clear(&self) {
        let mut peers = self.peers.write();
        let had = peers.len();
        peers.clear();
        info!(removed = had, "Cleared peer catalog");
        self.emit(CatalogEvent::CountChanged(0));
        self.persist(&peers);
    }

    /// Write the current snapshot explicitly.
    pub fn save(&self) {
        let peers = self.peers.read();
        self.persist(&peers);
    }

    pub fn get(&self, address: &NodeAddress) -> Option<PeerRecord> {
        self.peers.read().get(&address.key()).cloned()
    }

    pub fn get_all(&self) -> Vec<PeerRecord> {
        self.peers.read().values().cloned().collect()
    }

    pub fn get_by_status(&self, status: PeerStatus) -> Vec<PeerRecord> {
        self.peers
            .read()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn online_count(&self) -> usize {
        self.peers.read().values().filter(|r| r.is_online()).count()
    }

    /// Whether a record exists for `host:port`, in any spelling of the host.
    pub fn exists_by_address(&self, host: &str, port: u16) -> bool {
        match Host::parse(host) {
            Ok(host) => self
                .peers
                .read()
                .contains_key(&NodeAddress::new(host, port).key()),
            Err(_) => false,
        }
    }

    fn sweep_locked(&self, peers: &mut HashMap<String, PeerRecord>, now: u64) -> usize {
        let limit = self.config.offline_threshold.as_millis() as u64;
        let mut changed = 0;
        for record in peers.values_mut() {
            if record.status != PeerStatus::Offline && record.silence(now) > limit {
                record.status = PeerStatus::Offline;
                changed += 1;
                self.emit(CatalogEvent::PeerUpdated(record.clone()));
            }
        }
        changed
    }

    fn evict_stalest(peers: &mut HashMap<String, PeerRecord>) -> Option<String> {
        let stalest = peers
            .values()
            .min_by_key(|r| r.last_seen)
            .map(|r| r.key())?;
        peers.remove(&stalest);
        Some(stalest)
    }

    fn emit(&self, event: CatalogEvent) {
        if let Some(listener) = self.listener.read().as_ref() {
            listener.on_event(event);
        }
    }

    fn persist(&self, peers: &HashMap<String, PeerRecord>) {
        if let Err(e) = self.store.save(peers) {
            warn!(error = %e, count = peers.len(), "Failed to persist peer catalog");
        }
    }
}
