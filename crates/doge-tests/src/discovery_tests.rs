//! End-to-end orchestrator tests: scripted DNS, stub wire peers, real sockets.

use crate::harness::{
    fast_discovery_config, fast_handshake_config, wait_until, RecordingObserver, SlowProber,
    StaticResolver, StubPeer, TestCatalog,
};
use doge_catalog::{PeerSource, PeerStatus, UpdateOutcome};
use doge_discovery::{DiscoveryError, DiscoveryEvent, DiscoveryPhase, DiscoveryService};
use doge_network::{NetworkParams, NodeAddress};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const WAIT: Duration = Duration::from_secs(5);

fn params(fallback: Vec<String>) -> NetworkParams {
    NetworkParams {
        dns_seeds: vec!["seed.test".to_string()],
        fallback_peers: fallback,
        ..NetworkParams::mainnet()
    }
}

fn service(
    catalog: &TestCatalog,
    answers: Vec<SocketAddr>,
    observer: &Arc<RecordingObserver>,
) -> Arc<DiscoveryService> {
    Arc::new(
        DiscoveryService::new(params(Vec::new()), fast_discovery_config(), catalog.catalog.clone())
            .with_resolver(Arc::new(StaticResolver::new(answers)))
            .with_observer(observer.clone()),
    )
}

/// A loopback address nothing listens on.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

#[tokio::test]
async fn test_cycle_seeds_handshakes_and_gossips() {
    let c = StubPeer::with_addresses(Vec::new()).await;
    let a = StubPeer::with_addresses(vec![c.address()]).await;
    let b = StubPeer::with_addresses(Vec::new()).await;

    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, vec![a.socket_addr(), b.socket_addr()], &observer);

    let report = svc.run_cycle().await.unwrap();
    assert_eq!(report.seeded, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.gossiped, 1);
    assert!(report.snowball.is_some());

    assert_eq!(svc.get_total_peer_count(), 3);
    assert_eq!(svc.get_online_peer_count(), 2);
    let gossiped = catalog.catalog.get(&c.address()).unwrap();
    assert_eq!(gossiped.status, PeerStatus::Discovered);
    assert_eq!(gossiped.source, PeerSource::PeerExchange);

    let seeded = catalog.catalog.get(&a.address()).unwrap();
    assert_eq!(seeded.source, PeerSource::Dns);
    assert_eq!(seeded.user_agent, "TestAgent");
    assert_eq!(seeded.height, 12345);

    // Observers see the whole cycle, in order
    assert!(wait_until(WAIT, || observer.phases().last() == Some(&DiscoveryPhase::Idle)).await);
    assert_eq!(
        observer.phases(),
        vec![
            DiscoveryPhase::Seeding,
            DiscoveryPhase::Handshaking,
            DiscoveryPhase::Snowballing,
            DiscoveryPhase::HealthChecking,
            DiscoveryPhase::Idle,
        ]
    );
    assert!(wait_until(WAIT, || observer.counts().last() == Some(&3)).await);
    assert_eq!(observer.counts(), vec![1, 2, 3]);

    // The next cycle reaches the gossiped peer; the others are fresh
    let report = svc.run_cycle().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(svc.get_online_peer_count(), 3);
    assert!(c.connections() >= 1);
}

#[tokio::test]
async fn test_failed_handshake_reported() {
    let dead = closed_port().await;
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, vec![dead], &observer);

    let report = svc.run_cycle().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 0);
    assert!(report.snowball.is_none());

    let record = catalog.catalog.get(&NodeAddress::from(dead)).unwrap();
    assert_eq!(record.status, PeerStatus::Discovered);
    assert!(record.last_handshake_attempt.is_some());

    assert!(
        wait_until(WAIT, || observer
            .events()
            .iter()
            .any(|e| matches!(e, DiscoveryEvent::HandshakeFailed { address, .. } if *address == NodeAddress::from(dead))))
        .await
    );

    // Inside the retry window the peer is left alone
    let report = svc.run_cycle().await.unwrap();
    assert_eq!(report.attempted, 0);
}

#[tokio::test]
async fn test_fallback_peers_used_when_dns_empty() {
    let peer = StubPeer::with_addresses(Vec::new()).await;
    let catalog = TestCatalog::new();
    let svc = Arc::new(
        DiscoveryService::new(
            params(vec![peer.address().to_string()]),
            fast_discovery_config(),
            catalog.catalog.clone(),
        )
        .with_resolver(Arc::new(StaticResolver::new(Vec::new()))),
    );

    let report = svc.run_cycle().await.unwrap();
    assert_eq!(report.seeded, 0);
    assert_eq!(report.fallback, 1);

    let record = catalog.catalog.get(&peer.address()).unwrap();
    assert_eq!(record.status, PeerStatus::Online);
    assert_eq!(record.source, PeerSource::Fallback);
}

#[tokio::test]
async fn test_start_twice_and_stop() {
    let peer = StubPeer::with_addresses(Vec::new()).await;
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, vec![peer.socket_addr()], &observer);

    svc.start().unwrap();
    svc.start().unwrap();
    assert!(svc.is_running());

    assert!(wait_until(WAIT, || svc.get_online_peer_count() == 1).await);
    assert_eq!(peer.connections(), 1);

    svc.stop();
    assert!(!svc.is_running());
    assert_eq!(svc.get_total_peer_count(), 1);
}

#[tokio::test]
async fn test_reset_notifies_zero_then_restarts() {
    let peer = StubPeer::with_addresses(Vec::new()).await;
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, vec![peer.socket_addr()], &observer);

    svc.run_cycle().await.unwrap();
    assert_eq!(svc.get_total_peer_count(), 1);

    svc.reset(false).await.unwrap();
    assert_eq!(svc.get_total_peer_count(), 0);
    assert!(!svc.is_running());
    assert!(wait_until(WAIT, || observer.counts().last() == Some(&0)).await);
    assert_eq!(catalog.reopen().count(), 0);

    svc.reset(true).await.unwrap();
    assert!(svc.is_running());
    assert!(wait_until(WAIT, || svc.get_online_peer_count() == 1).await);
    svc.shutdown();
}

#[tokio::test]
async fn test_force_refresh_after_stop() {
    let peer = StubPeer::with_addresses(Vec::new()).await;
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, vec![peer.socket_addr()], &observer);

    svc.start().unwrap();
    assert!(wait_until(WAIT, || svc.get_online_peer_count() == 1).await);
    svc.stop();
    catalog.catalog.clear();

    svc.force_refresh().unwrap();
    assert!(wait_until(WAIT, || svc.get_online_peer_count() == 1).await);
    assert!(!svc.is_running());
}

#[tokio::test]
async fn test_reset_cancels_cycle_in_flight() {
    let peer = StubPeer::with_addresses(Vec::new()).await;
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = Arc::new(
        DiscoveryService::new(params(Vec::new()), fast_discovery_config(), catalog.catalog.clone())
            .with_resolver(Arc::new(StaticResolver::new(vec![peer.socket_addr()])))
            .with_prober(Arc::new(SlowProber::new(
                Duration::from_millis(300),
                fast_handshake_config(),
            )))
            .with_observer(observer.clone()),
    );

    svc.force_refresh().unwrap();
    assert!(wait_until(WAIT, || svc.phase() == DiscoveryPhase::Handshaking).await);

    svc.reset(false).await.unwrap();
    assert_eq!(svc.get_total_peer_count(), 0);
    assert_eq!(svc.phase(), DiscoveryPhase::Idle);

    // The handshake finishes after the reset; its result must not land
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(svc.get_total_peer_count(), 0);
    assert_eq!(catalog.reopen().count(), 0);

    // A later refresh starts from the empty catalog
    svc.force_refresh().unwrap();
    assert!(wait_until(WAIT, || svc.get_online_peer_count() == 1).await);
}

#[tokio::test]
async fn test_manual_connect_is_authoritative() {
    let peer = StubPeer::with_addresses(Vec::new()).await;
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, Vec::new(), &observer);

    let record = svc
        .connect_to_specific_peer(&peer.address().to_string())
        .await
        .unwrap();
    assert!(record.manually_updated);
    assert_eq!(record.status, PeerStatus::Online);
    assert_eq!(record.source, PeerSource::Manual);
    assert_eq!(record.user_agent, "TestAgent");

    // Background updates bounce off
    let mut background = record.clone();
    background.manually_updated = false;
    background.height = 1;
    assert_eq!(catalog.catalog.add_or_update(background), UpdateOutcome::Protected);
    assert_eq!(catalog.catalog.get(&peer.address()).unwrap().height, 12345);

    // A second manual refresh still lands
    let again = svc
        .connect_to_specific_peer(&peer.address().to_string())
        .await
        .unwrap();
    assert!(again.manually_updated);
    assert_eq!(peer.connections(), 2);

    // And survives a restart
    assert!(catalog.reopen().get(&peer.address()).unwrap().manually_updated);
}

#[tokio::test]
async fn test_manual_connect_failures() {
    let dead = closed_port().await;
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, Vec::new(), &observer);

    let err = svc.connect_to_specific_peer("[::1").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidAddress(_)));

    let err = svc
        .connect_to_specific_peer(&dead.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Handshake { .. }));
    assert_eq!(svc.get_total_peer_count(), 0);
}

#[tokio::test]
async fn test_shutdown_is_final() {
    let catalog = TestCatalog::new();
    let observer = Arc::new(RecordingObserver::default());
    let svc = service(&catalog, Vec::new(), &observer);

    svc.start().unwrap();
    svc.shutdown();
    assert!(!svc.is_running());
    assert!(matches!(svc.start(), Err(DiscoveryError::ShutDown)));
    assert!(matches!(svc.force_refresh(), Err(DiscoveryError::ShutDown)));
}
