//! Observer notifications.
//!
//! Producers (catalog mutations, handshake workers, the phase machine) push
//! [`DiscoveryEvent`]s into one unbounded channel. A single dispatcher task
//! drains it and calls every registered [`DiscoveryObserver`], so observers see
//! one ordered stream no matter how many tasks produced it.

use crate::DiscoveryPhase;
use doge_catalog::{CatalogEvent, CatalogListener, PeerRecord};
use doge_network::NodeAddress;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Something observers are told about.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A catalog record was inserted or changed.
    PeerUpdated(PeerRecord),
    /// The catalog size changed.
    TotalCountChanged(usize),
    /// A handshake attempt failed.
    HandshakeFailed { address: NodeAddress, reason: String },
    /// The orchestrator moved to another phase.
    PhaseChanged(DiscoveryPhase),
}

impl From<CatalogEvent> for DiscoveryEvent {
    fn from(event: CatalogEvent) -> Self {
        match event {
            CatalogEvent::PeerUpdated(record) => DiscoveryEvent::PeerUpdated(record),
            CatalogEvent::CountChanged(count) => DiscoveryEvent::TotalCountChanged(count),
        }
    }
}

/// Callbacks delivered on the dispatcher task.
///
/// All methods default to doing nothing.
pub trait DiscoveryObserver: Send + Sync + 'static {
    fn on_peer_updated(&self, _record: &PeerRecord) {}

    fn on_total_count_changed(&self, _count: usize) {}

    fn on_handshake_failed(&self, _address: &NodeAddress, _reason: &str) {}

    fn on_phase_changed(&self, _phase: DiscoveryPhase) {}
}

impl DiscoveryEvent {
    fn dispatch(&self, observer: &dyn DiscoveryObserver) {
        match self {
            DiscoveryEvent::PeerUpdated(record) => observer.on_peer_updated(record),
            DiscoveryEvent::TotalCountChanged(count) => observer.on_total_count_changed(*count),
            DiscoveryEvent::HandshakeFailed { address, reason } => {
                observer.on_handshake_failed(address, reason)
            }
            DiscoveryEvent::PhaseChanged(phase) => observer.on_phase_changed(*phase),
        }
    }
}

/// Registered observers.
pub(crate) type ObserverList = Arc<RwLock<Vec<Arc<dyn DiscoveryObserver>>>>;

/// Feeds catalog mutations into the event channel.
pub(crate) struct CatalogForwarder {
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl CatalogForwarder {
    pub(crate) fn new(tx: mpsc::UnboundedSender<DiscoveryEvent>) -> Self {
        Self { tx }
    }
}

impl CatalogListener for CatalogForwarder {
    fn on_event(&self, event: CatalogEvent) {
        let _ = self.tx.send(event.into());
    }
}

/// Drain `rx` into `observers` until every sender is gone.
pub(crate) fn spawn_dispatcher(
    mut rx: mpsc::UnboundedReceiver<DiscoveryEvent>,
    observers: ObserverList,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let current = observers.read().clone();
            for observer in current.iter() {
                event.dispatch(observer.as_ref());
            }
        }
        debug!("Observer dispatcher stopped");
    })
}
