//! Test harness for integration tests.
//!
//! Provides stub wire peers, catalogs backed by temporary snapshot files, a
//! scripted DNS backend and an observer that records everything it is told.

use bytes::BytesMut;
use doge_catalog::{CatalogConfig, JsonFileStore, PeerCatalog, PeerRecord};
use doge_discovery::{
    AddressProber, DiscoveryConfig, DiscoveryEvent, DiscoveryObserver, DiscoveryPhase, SnowballConfig,
};
use doge_network::{
    AddrEntry, HandshakeClient, HandshakeConfig, HandshakeOutcome, HostResolver, Message,
    MessageCodec, NetworkResult, NodeAddress, PeerVersion, ResolverConfig, VersionMessage, MAINNET_MAGIC, NODE_NETWORK, TESTNET_MAGIC,
};
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Encoder, Framed};

/// How a stub peer behaves once a client connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    /// Full version/verack exchange, answers getaddr and ping.
    Normal,
    /// Accepts the connection and never says anything.
    Silent,
    /// Replies with testnet magic.
    WrongMagic,
}

/// Stub peer settings.
#[derive(Debug, Clone)]
pub struct StubPeerConfig {
    pub user_agent: String,
    pub start_height: i32,
    pub services: u64,
    /// Returned in answer to getaddr.
    pub addresses: Vec<NodeAddress>,
    pub mode: StubMode,
}

impl Default for StubPeerConfig {
    fn default() -> Self {
        Self {
            user_agent: "TestAgent".to_string(),
            start_height: 12345,
            services: NODE_NETWORK,
            addresses: Vec::new(),
            mode: StubMode::Normal,
        }
    }
}

/// A wire-speaking peer on a loopback port. Stops when dropped.
pub struct StubPeer {
    address: NodeAddress,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubPeer {
    /// Bind a loopback port and start serving.
    pub async fn spawn(config: StubPeerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub peer");
        let local = listener.local_addr().expect("Stub peer has no local address");
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let config = config.clone();
                tokio::spawn(async move {
                    match config.mode {
                        StubMode::Normal => serve(socket, local, config).await,
                        StubMode::Silent => hold(socket).await,
                        StubMode::WrongMagic => wrong_magic(socket, local, config).await,
                    }
                });
            }
        });

        Self {
            address: NodeAddress::from(local),
            connections,
            task,
        }
    }

    /// A normal peer with the given gossip.
    pub async fn with_addresses(addresses: Vec<NodeAddress>) -> Self {
        Self::spawn(StubPeerConfig {
            addresses,
            ..Default::default()
        })
        .await
    }

    pub fn address(&self) -> NodeAddress {
        self.address.clone()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.address
            .socket_addr()
            .expect("Stub peer address is an IP")
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for StubPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: TcpStream, local: SocketAddr, config: StubPeerConfig) {
    let mut framed = Framed::new(socket, MessageCodec::new());
    while let Some(Ok(msg)) = framed.next().await {
        let replies = match msg {
            Message::Version(theirs) => vec![
                Message::Version(version(local, &config, theirs.nonce)),
                Message::Verack,
            ],
            Message::GetAddr => {
                let entries = config
                    .addresses
                    .iter()
                    .map(|addr| AddrEntry::new(addr, NODE_NETWORK, 0))
                    .collect();
                vec![Message::Addr(entries)]
            }
            Message::Ping(nonce) => vec![Message::Pong(nonce)],
            _ => Vec::new(),
        };
        for reply in replies {
            if framed.send(reply).await.is_err() {
                return;
            }
        }
    }
}

async fn hold(mut socket: TcpStream) {
    let mut buf = [0u8; 1024];
    while let Ok(n) = socket.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

async fn wrong_magic(mut socket: TcpStream, local: SocketAddr, config: StubPeerConfig) {
    let mut buf = [0u8; 1024];
    if socket.read(&mut buf).await.unwrap_or(0) == 0 {
        return;
    }
    let mut out = BytesMut::new();
    let mut codec = MessageCodec::with_magic(TESTNET_MAGIC);
    if codec
        .encode(Message::Version(version(local, &config, 7)), &mut out)
        .is_ok()
    {
        let _ = socket.write_all(&out).await;
    }
    hold(socket).await;
}

fn version(local: SocketAddr, config: &StubPeerConfig, their_nonce: u64) -> VersionMessage {
    let mut msg = VersionMessage::new(
        &NodeAddress::from(local),
        config.services,
        config.user_agent.clone(),
        config.start_height,
        their_nonce ^ 0x5eed,
    );
    msg.relay = true;
    msg
}

/// Catalog persisted to a temporary directory.
pub struct TestCatalog {
    pub catalog: Arc<PeerCatalog>,
    dir: TempDir,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self::with_config(CatalogConfig::default())
    }

    pub fn with_config(config: CatalogConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let catalog = Arc::new(PeerCatalog::open(
            config,
            Box::new(JsonFileStore::in_dir(dir.path())),
        ));
        Self { catalog, dir }
    }

    /// Open a second catalog over the same snapshot file.
    pub fn reopen(&self) -> PeerCatalog {
        PeerCatalog::open(
            self.catalog.config().clone(),
            Box::new(JsonFileStore::in_dir(self.dir.path())),
        )
    }

    pub fn snapshot_path(&self) -> std::path::PathBuf {
        JsonFileStore::in_dir(self.dir.path()).path().to_path_buf()
    }
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// DNS backend answering every lookup with a fixed list.
pub struct StaticResolver {
    answers: Vec<SocketAddr>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn new(answers: Vec<SocketAddr>) -> Self {
        Self {
            answers,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl HostResolver for StaticResolver {
    fn lookup(&self, _host: &str, _port: u16) -> std::io::Result<Vec<SocketAddr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.clone())
    }
}

/// Real handshakes that start only after a fixed delay, to hold a cycle open.
pub struct SlowProber {
    delay: Duration,
    client: HandshakeClient,
}

impl SlowProber {
    pub fn new(delay: Duration, config: HandshakeConfig) -> Self {
        Self {
            delay,
            client: HandshakeClient::new(config),
        }
    }
}

impl AddressProber for SlowProber {
    fn probe(&self, addr: NodeAddress) -> BoxFuture<'static, NetworkResult<HandshakeOutcome>> {
        let delay = self.delay;
        let client = self.client.clone();
        async move {
            tokio::time::sleep(delay).await;
            client.perform(&addr).await
        }
        .boxed()
    }
}

/// Observer keeping every event in arrival order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<DiscoveryEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<DiscoveryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Total counts reported, in order.
    pub fn counts(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DiscoveryEvent::TotalCountChanged(count) => Some(count),
                _ => None,
            })
            .collect()
    }

    pub fn phases(&self) -> Vec<DiscoveryPhase> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DiscoveryEvent::PhaseChanged(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: DiscoveryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl DiscoveryObserver for RecordingObserver {
    fn on_peer_updated(&self, record: &PeerRecord) {
        self.push(DiscoveryEvent::PeerUpdated(record.clone()));
    }

    fn on_total_count_changed(&self, count: usize) {
        self.push(DiscoveryEvent::TotalCountChanged(count));
    }

    fn on_handshake_failed(&self, address: &NodeAddress, reason: &str) {
        self.push(DiscoveryEvent::HandshakeFailed {
            address: address.clone(),
            reason: reason.to_string(),
        });
    }

    fn on_phase_changed(&self, phase: DiscoveryPhase) {
        self.push(DiscoveryEvent::PhaseChanged(phase));
    }
}

/// Discovery settings with every delay shortened for tests.
pub fn fast_discovery_config() -> DiscoveryConfig {
    let mut config = DiscoveryConfig {
        resolver: ResolverConfig {
            queries_per_seed: 1,
            query_delay_min: Duration::ZERO,
            query_delay_max: Duration::ZERO,
            seed_delay: Duration::ZERO,
            dns_timeout: Duration::from_secs(2),
        },
        snowball: SnowballConfig {
            round_delay: Duration::ZERO,
            ..Default::default()
        },
        reset_settle_delay: Duration::from_millis(20),
        manual_timeout: Duration::from_secs(3),
        ..Default::default()
    };
    config.handshake.connect_timeout = Duration::from_secs(2);
    config.handshake.version_timeout = Duration::from_millis(500);
    config.handshake.addr_timeout = Duration::from_millis(300);
    config
}

/// The handshake settings from [`fast_discovery_config`], for mainnet.
pub fn fast_handshake_config() -> HandshakeConfig {
    let mut config = fast_discovery_config().handshake;
    config.magic = MAINNET_MAGIC;
    config
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A version summary for handcrafted outcomes.
pub fn peer_version(user_agent: &str, start_height: i32) -> PeerVersion {
    PeerVersion {
        version: 70015,
        user_agent: user_agent.to_string(),
        services: NODE_NETWORK,
        start_height,
        relay: true,
        latency_ms: 1,
    }
}
