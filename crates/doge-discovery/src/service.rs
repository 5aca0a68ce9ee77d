//! Discovery orchestrator.
//!
//! One cycle walks the phases in order:
//!
//! ```text
//! Idle -> Seeding -> Handshaking -> Snowballing -> HealthChecking -> Idle
//! ```
//!
//! While running, background loops repeat the cycle on the rediscovery
//! interval, sweep stale peers to Offline, prune the catalog daily and keep a
//! minimum number of Online peers with capped exponential backoff. All timers
//! hang off one cancellation token; stopping cancels them and drops pending
//! results, but handshakes already on a socket finish or time out on their own.

use crate::backoff::Backoff;
use crate::events::{spawn_dispatcher, CatalogForwarder, DiscoveryEvent, DiscoveryObserver, ObserverList};
use crate::prober::{probe_batch, record_handshake, AddressProber};
use crate::snowball::{SnowballAmplifier, SnowballConfig, SnowballReport};
use crate::{DiscoveryError, DiscoveryResult, PoolConfig, WorkerPool};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use doge_catalog::{now_millis, PeerCatalog, PeerRecord, PeerSource, PeerStatus};
use doge_network::{
    HandshakeClient, HandshakeConfig, HostResolver, NetworkError, NetworkParams, NodeAddress,
    ResolverConfig, SeedResolver,
};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the orchestrator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryPhase {
    Idle,
    Seeding,
    Handshaking,
    Snowballing,
    HealthChecking,
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoveryPhase::Idle => "idle",
            DiscoveryPhase::Seeding => "seeding",
            DiscoveryPhase::Handshaking => "handshaking",
            DiscoveryPhase::Snowballing => "snowballing",
            DiscoveryPhase::HealthChecking => "health-checking",
        };
        f.write_str(name)
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Wire handshake settings. The magic is taken from the network params.
    pub handshake: HandshakeConfig,
    /// DNS seed querying.
    pub resolver: ResolverConfig,
    /// Handshake workers.
    pub pool: PoolConfig,
    /// Snowball rounds.
    pub snowball: SnowballConfig,
    /// Minimum gap between background handshakes with the same non-Online peer.
    pub handshake_retry: Duration,
    /// Online peers are re-handshaken once their last attempt is this old.
    pub online_refresh: Duration,
    /// Handshakes started per cycle.
    pub max_handshakes_per_cycle: usize,
    /// Gossiped addresses registered per handshake.
    pub addresses_per_handshake: usize,
    /// Online peers needed before snowballing.
    pub snowball_min_online: usize,
    /// Online peers the maintenance loop tries to keep.
    pub min_online_peers: usize,
    /// Full cycle period.
    pub rediscovery_interval: Duration,
    /// Offline sweep period.
    pub sweep_interval: Duration,
    /// Stale record pruning period.
    pub cleanup_interval: Duration,
    /// First maintenance retry delay.
    pub maintenance_base: Duration,
    /// Maintenance retry ceiling.
    pub maintenance_max: Duration,
    /// Pause after a reset before restarting.
    pub reset_settle_delay: Duration,
    /// Floor on the time allowed for a user-triggered handshake. The handshake
    /// worst case wins when it is longer. Also bounds how long `reset` waits
    /// for a cancelled cycle.
    pub manual_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            resolver: ResolverConfig::default(),
            pool: PoolConfig::default(),
            snowball: SnowballConfig::default(),
            handshake_retry: Duration::from_secs(30),
            online_refresh: Duration::from_secs(6 * 3600),
            max_handshakes_per_cycle: 256,
            addresses_per_handshake: 32,
            snowball_min_online: 2,
            min_online_peers: 8,
            rediscovery_interval: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(2 * 3600),
            cleanup_interval: Duration::from_secs(24 * 3600),
            maintenance_base: Duration::from_secs(30),
            maintenance_max: Duration::from_secs(10 * 60),
            reset_settle_delay: Duration::from_secs(1),
            manual_timeout: Duration::from_secs(10),
        }
    }
}

/// Summary of one discovery cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Addresses returned by DNS seeds.
    pub seeded: usize,
    /// Fallback peers used because seeding found nothing.
    pub fallback: usize,
    /// Handshakes attempted.
    pub attempted: usize,
    /// Handshakes that succeeded.
    pub succeeded: usize,
    /// Addresses learned from handshake gossip.
    pub gossiped: usize,
    /// Snowball run, if the baseline was met.
    pub snowball: Option<SnowballReport>,
    /// Records moved to Offline by the closing sweep.
    pub went_offline: usize,
    /// Online peers at the end of the cycle.
    pub online: usize,
}

/// Clears a flag when dropped, so a cancelled cycle releases it too.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The discovery orchestrator.
pub struct DiscoveryService {
    params: NetworkParams,
    config: DiscoveryConfig,
    catalog: Arc<PeerCatalog>,
    resolver: SeedResolver,
    prober: Arc<dyn AddressProber>,
    pool: WorkerPool,
    observers: ObserverList,
    event_tx: mpsc::UnboundedSender<DiscoveryEvent>,
    /// Taken by the dispatcher on first use.
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<DiscoveryEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    phase: RwLock<DiscoveryPhase>,
    running: AtomicBool,
    shut_down: AtomicBool,
    cycle_active: AtomicBool,
    cancel: Mutex<CancellationToken>,
    /// Addresses with a handshake in flight, and when it was claimed.
    in_flight: DashMap<String, Instant>,
}

impl DiscoveryService {
    /// Create a stopped service over `catalog`.
    ///
    /// Catalog mutations are forwarded to observers from here on.
    pub fn new(params: NetworkParams, mut config: DiscoveryConfig, catalog: Arc<PeerCatalog>) -> Self {
        config.handshake.magic = params.magic;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        catalog.set_listener(Arc::new(CatalogForwarder::new(event_tx.clone())));

        let resolver = SeedResolver::new(config.resolver.clone());
        let prober: Arc<dyn AddressProber> = Arc::new(HandshakeClient::new(config.handshake.clone()));
        let pool = WorkerPool::new(config.pool.clone());

        Self {
            params,
            config,
            catalog,
            resolver,
            prober,
            pool,
            observers: Arc::new(RwLock::new(Vec::new())),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            dispatcher: Mutex::new(None),
            phase: RwLock::new(DiscoveryPhase::Idle),
            running: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            cycle_active: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            in_flight: DashMap::new(),
        }
    }

    /// Use a different DNS backend.
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = self.resolver.clone().with_resolver(resolver);
        self
    }

    /// Use a different handshake implementation.
    pub fn with_prober(mut self, prober: Arc<dyn AddressProber>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_observer(self, observer: Arc<dyn DiscoveryObserver>) -> Self {
        self.add_observer(observer);
        self
    }

    /// Register an observer. Delivery happens on a single dispatcher task.
    pub fn add_observer(&self, observer: Arc<dyn DiscoveryObserver>) {
        self.observers.write().push(observer);
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<PeerCatalog> {
        &self.catalog
    }

    /// Start the background loops. Starting twice is a no-op.
    pub fn start(self: &Arc<Self>) -> DiscoveryResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DiscoveryError::ShutDown);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Discovery already running");
            return Ok(());
        }
        self.ensure_dispatcher();

        let token = self.live_token();
        self.spawn_cycle_loop(token.clone());
        self.spawn_sweep_loop(token.clone());
        self.spawn_cleanup_loop(token.clone());
        self.spawn_maintenance_loop(token);

        info!(
            network = %self.params.name,
            peers = self.catalog.count(),
            "Peer discovery started"
        );
        Ok(())
    }

    /// Cancel scheduled work and any cycle in progress. Catalog state is kept
    /// and the service can still be refreshed or started again.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.lock().cancel();
        self.set_phase(DiscoveryPhase::Idle);
        info!("Peer discovery stopped");
    }

    /// Stop and release the worker pool. The service cannot be restarted.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop();
        self.pool.shutdown();
        self.catalog.save();
        info!("Peer discovery shut down");
    }

    /// Run a cycle now, in the background.
    ///
    /// Ignored if a cycle is already in progress.
    pub fn force_refresh(self: &Arc<Self>) -> DiscoveryResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DiscoveryError::ShutDown);
        }
        self.ensure_dispatcher();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_cycle().await;
        });
        Ok(())
    }

    /// Stop, clear the catalog and optionally start again after a short pause.
    ///
    /// Observers see a zero count before any restart.
    pub async fn reset(self: &Arc<Self>, restart: bool) -> DiscoveryResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DiscoveryError::ShutDown);
        }
        self.ensure_dispatcher();
        self.stop();
        // Cycles run outside the scheduler too, so cancel whether or not we were running
        self.cancel.lock().cancel();
        self.wait_for_cycle().await;
        self.in_flight.clear();
        self.catalog.clear();
        info!(restart, "Peer catalog reset");

        if restart {
            tokio::time::sleep(self.config.reset_settle_delay).await;
            self.start()?;
        }
        Ok(())
    }

    /// Handshake with one user-supplied address and store the result as an
    /// authoritative, manually-updated record.
    ///
    /// Runs on the caller's task, outside the worker pool and in-flight
    /// tracking.
    pub async fn connect_to_specific_peer(&self, input: &str) -> DiscoveryResult<PeerRecord> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DiscoveryError::ShutDown);
        }
        self.ensure_dispatcher();

        let address = NodeAddress::parse(input.trim(), self.params.default_port)
            .map_err(|e| DiscoveryError::InvalidAddress(format!("{}: {}", input.trim(), e)))?;
        info!(peer = %address, "Manual handshake requested");
        self.catalog.mark_attempt(&address);

        let result = match tokio::time::timeout(
            self.manual_budget(),
            self.prober.probe(address.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout(format!(
                "manual handshake with {} timed out",
                address
            ))),
        };

        match result {
            Ok(outcome) => {
                let (record, _) = record_handshake(&self.catalog, &outcome, PeerSource::Manual, true);
                self.register_gossip(&outcome.addresses);
                info!(
                    peer = %address,
                    agent = %record.user_agent,
                    height = record.height,
                    latency_ms = record.latency_ms,
                    "Manual handshake succeeded"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(peer = %address, error = %e, "Manual handshake failed");
                self.notify_failure(&address, &e);
                Err(DiscoveryError::Handshake {
                    peer: address.key(),
                    source: e,
                })
            }
        }
    }

    /// Run one full cycle on the current task.
    ///
    /// Returns `None` if another cycle is already in progress, or if the cycle
    /// is cancelled by `stop` or `reset` before it finishes. A cancelled cycle
    /// writes nothing further to the catalog.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        if self.cycle_active.swap(true, Ordering::SeqCst) {
            debug!("Discovery cycle already in progress");
            return None;
        }
        let _active = FlagGuard(&self.cycle_active);
        self.ensure_dispatcher();

        let token = self.live_token();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Discovery cycle cancelled");
                self.set_phase(DiscoveryPhase::Idle);
                None
            }
            report = self.cycle() => Some(report),
        }
    }

    async fn cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        self.set_phase(DiscoveryPhase::Seeding);
        self.seed(&mut report).await;

        self.set_phase(DiscoveryPhase::Handshaking);
        self.handshake_candidates(&mut report).await;

        let online = self.catalog.online_count();
        if online >= self.config.snowball_min_online {
            self.set_phase(DiscoveryPhase::Snowballing);
            let amplifier = SnowballAmplifier::new(
                self.config.snowball.clone(),
                Arc::clone(&self.catalog),
                Arc::clone(&self.prober),
                self.pool.clone(),
            );
            report.snowball = Some(amplifier.run().await);
        } else {
            debug!(
                online,
                required = self.config.snowball_min_online,
                "Too few online peers to snowball"
            );
        }

        self.set_phase(DiscoveryPhase::HealthChecking);
        report.went_offline = self.catalog.status_sweep();
        report.online = self.catalog.online_count();
        self.set_phase(DiscoveryPhase::Idle);

        info!(
            seeded = report.seeded,
            attempted = report.attempted,
            succeeded = report.succeeded,
            gossiped = report.gossiped,
            snowballed = report.snowball.as_ref().map_or(0, |s| s.discovered.len()),
            online = report.online,
            total = self.catalog.count(),
            "Discovery cycle complete"
        );
        report
    }

    pub fn get_all_peers(&self) -> Vec<PeerRecord> {
        self.catalog.get_all()
    }

    pub fn get_total_peer_count(&self) -> usize {
        self.catalog.count()
    }

    pub fn get_online_peer_count(&self) -> usize {
        self.catalog.online_count()
    }

    pub fn phase(&self) -> DiscoveryPhase {
        *self.phase.read()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Query every DNS seed, falling back to the built-in list when nothing is
    /// known at all.
    async fn seed(&self, report: &mut CycleReport) {
        let catalog = &self.catalog;
        let found = self
            .resolver
            .resolve_all(&self.params.dns_seeds, self.params.default_port, |addr| {
                catalog.register_discovered(addr, PeerSource::Dns);
            })
            .await;
        report.seeded = found.len();

        if found.is_empty() && self.catalog.count() == 0 {
            let fallback = self.params.fallback_addresses();
            warn!(count = fallback.len(), "DNS seeds returned nothing, using fallback peers");
            for addr in &fallback {
                self.catalog.register_discovered(addr, PeerSource::Fallback);
            }
            report.fallback = fallback.len();
        }
    }

    /// Handshake with every catalog peer that is due, on the worker pool.
    async fn handshake_candidates(&self, report: &mut CycleReport) {
        let candidates = self.select_candidates();
        if candidates.is_empty() {
            debug!("No peers due for a handshake");
            return;
        }

        let mut sources = HashMap::with_capacity(candidates.len());
        let mut addrs = Vec::with_capacity(candidates.len());
        for record in candidates {
            if !self.claim(&record.address) {
                continue;
            }
            self.catalog.mark_attempt(&record.address);
            sources.insert(record.key(), record.source);
            addrs.push(record.address);
        }
        report.attempted = addrs.len();
        info!(count = addrs.len(), "Handshaking with peers");

        let mut results = probe_batch(&self.pool, &self.prober, addrs).await;
        while let Some((peer, result)) = results.next().await {
            self.in_flight.remove(&peer.key());
            match result {
                Ok(outcome) => {
                    let source = sources
                        .remove(&peer.key())
                        .unwrap_or(PeerSource::PeerExchange);
                    record_handshake(&self.catalog, &outcome, source, false);
                    report.succeeded += 1;
                    report.gossiped += self.register_gossip(&outcome.addresses);
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "Handshake failed");
                    self.notify_failure(&peer, &e);
                }
            }
        }
    }

    /// Non-Online peers past the retry gap, then Online peers due a refresh.
    /// Least recently attempted first.
    fn select_candidates(&self) -> Vec<PeerRecord> {
        let now = now_millis();
        let refresh = self.config.online_refresh.as_millis() as u64;

        let mut due: Vec<PeerRecord> = self
            .catalog
            .get_all()
            .into_iter()
            .filter(|record| match record.status {
                PeerStatus::Online => record
                    .last_handshake_attempt
                    .map_or(true, |at| now.saturating_sub(at) >= refresh),
                PeerStatus::Discovered | PeerStatus::Offline => {
                    record.should_attempt_handshake(now, self.config.handshake_retry)
                }
            })
            .collect();

        due.sort_by_key(|record| {
            (
                record.status == PeerStatus::Online,
                record.last_handshake_attempt.unwrap_or(0),
            )
        });
        due.truncate(self.config.max_handshakes_per_cycle);
        due
    }

    /// Register gossiped addresses, capped per handshake. Returns how many were new.
    fn register_gossip(&self, addresses: &[NodeAddress]) -> usize {
        addresses
            .iter()
            .take(self.config.addresses_per_handshake)
            .filter(|addr| self.catalog.register_discovered(addr, PeerSource::PeerExchange))
            .count()
    }

    /// Claim `address` for a handshake. Stale claims from cancelled cycles
    /// expire after one full handshake's worth of timeouts.
    fn claim(&self, address: &NodeAddress) -> bool {
        let now = Instant::now();
        match self.in_flight.entry(address.key()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.claim_ttl() {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    fn claim_ttl(&self) -> Duration {
        let hs = &self.config.handshake;
        hs.connect_timeout + hs.version_timeout + hs.addr_timeout + Duration::from_secs(5)
    }

    fn notify_failure(&self, address: &NodeAddress, error: &NetworkError) {
        let _ = self.event_tx.send(DiscoveryEvent::HandshakeFailed {
            address: address.clone(),
            reason: error.to_string(),
        });
    }

    fn set_phase(&self, phase: DiscoveryPhase) {
        {
            let mut current = self.phase.write();
            if *current == phase {
                return;
            }
            *current = phase;
        }
        debug!(phase = %phase, "Discovery phase changed");
        let _ = self.event_tx.send(DiscoveryEvent::PhaseChanged(phase));
    }

    /// Spawn the observer dispatcher on first use.
    fn ensure_dispatcher(&self) {
        if let Some(rx) = self.event_rx.lock().take() {
            *self.dispatcher.lock() = Some(spawn_dispatcher(rx, Arc::clone(&self.observers)));
        }
    }

    /// The current cancellation token, replaced first if a previous `stop` or
    /// `reset` already cancelled it.
    fn live_token(&self) -> CancellationToken {
        let mut token = self.cancel.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    /// Wait for a cancelled cycle to unwind and release the cycle flag.
    async fn wait_for_cycle(&self) {
        let unwound = tokio::time::timeout(self.config.manual_timeout, async {
            while self.cycle_active.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if unwound.is_err() {
            warn!("Discovery cycle still active after cancellation");
        }
    }

    /// Time allowed for a manual handshake: the configured floor, or the
    /// full handshake worst case if that is longer.
    fn manual_budget(&self) -> Duration {
        self.config
            .manual_timeout
            .max(self.config.handshake.worst_case())
    }

    fn spawn_cycle_loop(self: &Arc<Self>, token: CancellationToken) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let period = service.config.rediscovery_interval;
            let mut ticker = interval_at(Instant::now(), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = service.run_cycle() => {}
                        }
                    }
                }
            }
            debug!("Discovery cycle loop stopped");
        });
    }

    fn spawn_sweep_loop(self: &Arc<Self>, token: CancellationToken) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let period = service.config.sweep_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let changed = service.catalog.status_sweep();
                        debug!(changed, "Status sweep complete");
                    }
                }
            }
        });
    }

    fn spawn_cleanup_loop(self: &Arc<Self>, token: CancellationToken) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let period = service.config.cleanup_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = service.catalog.cleanup();
                        info!(
                            offline = report.marked_offline,
                            removed = report.removed,
                            "Catalog cleanup complete"
                        );
                    }
                }
            }
        });
    }

    /// Keep at least `min_online_peers` Online, retrying with capped
    /// exponential backoff while short.
    fn spawn_maintenance_loop(self: &Arc<Self>, token: CancellationToken) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let base = service.config.maintenance_base;
            let required = service.config.min_online_peers;
            let mut backoff = Backoff::new(base, service.config.maintenance_max);
            let mut ticker = interval_at(Instant::now() + base, base);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let online = service.catalog.online_count();
                if online >= required {
                    if backoff.attempts() > 0 {
                        info!(online, required, "Online peer target reached");
                    }
                    backoff.reset();
                    continue;
                }
                if !backoff.can_attempt() {
                    continue;
                }

                info!(online, required, attempt = backoff.attempts() + 1, "Too few online peers, rediscovering");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = service.run_cycle() => {}
                }

                if service.catalog.online_count() < required {
                    backoff.mark_failed();
                    debug!(retry_in = ?backoff.delay(), "Online peer target still unmet");
                } else {
                    backoff.reset();
                }
            }
        });
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
    }
}
