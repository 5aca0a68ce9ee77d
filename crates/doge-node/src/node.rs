//! Node implementation.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use doge_catalog::{now_millis, JsonFileStore, PeerCatalog, PeerRecord, PeerStatus};
use doge_discovery::{DiscoveryObserver, DiscoveryPhase, DiscoveryService};
use doge_network::NodeAddress;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between status lines while running.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Writes discovery events to the log.
struct LogObserver;

impl DiscoveryObserver for LogObserver {
    fn on_peer_updated(&self, record: &PeerRecord) {
        debug!(
            peer = %record.address,
            status = %record.status,
            source = %record.source,
            agent = %record.user_agent,
            "Peer updated"
        );
    }

    fn on_total_count_changed(&self, count: usize) {
        debug!(count, "Known peers changed");
    }

    fn on_handshake_failed(&self, address: &NodeAddress, reason: &str) {
        debug!(peer = %address, reason, "Handshake failed");
    }

    fn on_phase_changed(&self, phase: DiscoveryPhase) {
        info!(phase = %phase, "Discovery phase");
    }
}

/// Hosts the discovery service over a persistent catalog.
pub struct Node {
    /// Node configuration.
    config: NodeConfig,
    /// Discovery orchestrator.
    discovery: Arc<DiscoveryService>,
    /// Shutdown flag.
    shutdown: AtomicBool,
}

impl Node {
    /// Create a new node.
    pub fn new(config: NodeConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;

        let params = config.network_params()?;
        let store = JsonFileStore::in_dir(&config.data_dir);
        info!(path = %store.path().display(), "Peer snapshot");
        let catalog = Arc::new(PeerCatalog::open(config.catalog_config(), Box::new(store)));
        info!(peers = catalog.count(), online = catalog.online_count(), "Peer catalog loaded");

        let discovery = Arc::new(
            DiscoveryService::new(params, config.discovery_config(), catalog)
                .with_observer(Arc::new(LogObserver)),
        );

        Ok(Arc::new(Self {
            config,
            discovery,
            shutdown: AtomicBool::new(false),
        }))
    }

    /// Clear the catalog without restarting discovery.
    pub async fn reset(&self) -> Result<()> {
        self.discovery.reset(false).await?;
        Ok(())
    }

    /// Refresh one peer on the user's behalf.
    pub async fn connect(&self, address: &str) -> Result<()> {
        let record = self
            .discovery
            .connect_to_specific_peer(address)
            .await
            .with_context(|| format!("Failed to connect to {}", address))?;
        info!(
            peer = %record.address,
            agent = %record.user_agent,
            version = record.version,
            height = record.height,
            services = %record.services_text(),
            latency_ms = record.latency_ms,
            "Peer refreshed"
        );
        Ok(())
    }

    /// Run a single discovery cycle and report the catalog.
    pub async fn run_once(&self) -> Result<()> {
        if self.discovery.run_cycle().await.is_none() {
            info!("A discovery cycle was already running");
        }
        self.report();
        Ok(())
    }

    /// Run discovery until shutdown.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        info!(name = %self.config.node_name, "Starting peer discovery...");
        self.discovery.start()?;

        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        ticker.tick().await;
        while !self.shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;
            info!(
                phase = %self.discovery.phase(),
                total = self.discovery.get_total_peer_count(),
                online = self.discovery.get_online_peer_count(),
                "Discovery status"
            );
        }
        Ok(())
    }

    /// Shutdown the node.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down node...");
        self.discovery.shutdown();
        self.report();
    }

    /// Log the Online peers, freshest first.
    fn report(&self) {
        let now = now_millis();
        let mut online: Vec<PeerRecord> = self
            .discovery
            .get_all_peers()
            .into_iter()
            .filter(|record| record.status == PeerStatus::Online)
            .collect();
        online.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        for record in &online {
            info!(
                peer = %record.address,
                agent = %record.user_agent,
                height = record.height,
                latency_ms = record.latency_ms,
                services = %record.services_text(),
                seen = %record.last_seen_text(now),
                "Online peer"
            );
        }
        info!(
            total = self.discovery.get_total_peer_count(),
            online = online.len(),
            "Peer catalog summary"
        );
    }
}
