//! Wire handshake tests against stub peers.

use crate::harness::{fast_handshake_config, StubMode, StubPeer, StubPeerConfig};
use doge_network::{HandshakeClient, NetworkError, NodeAddress, PROTOCOL_VERSION};

#[tokio::test]
async fn test_handshake_reports_agent_and_height() {
    let peer = StubPeer::spawn(StubPeerConfig::default()).await;
    let client = HandshakeClient::new(fast_handshake_config());

    let outcome = client.perform(&peer.address()).await.unwrap();

    assert_eq!(outcome.peer, peer.address());
    assert_eq!(outcome.info.user_agent, "TestAgent");
    assert_eq!(outcome.info.start_height, 12345);
    assert_eq!(outcome.info.version, PROTOCOL_VERSION);
    assert!(outcome.info.relay);
    assert!(outcome.info.latency_ms >= 0);
    assert_eq!(peer.connections(), 1);
}

#[tokio::test]
async fn test_gossip_filtered() {
    let stub_config = StubPeerConfig {
        addresses: vec![
            NodeAddress::parse("10.20.0.1:22556", 22556).unwrap(),
            NodeAddress::parse("[::ffff:10.20.0.1]:22556", 22556).unwrap(),
            NodeAddress::parse("0.0.0.0:22556", 22556).unwrap(),
            NodeAddress::parse("[2001:db8::7]:22556", 22556).unwrap(),
        ],
        ..Default::default()
    };
    let peer = StubPeer::spawn(stub_config).await;
    let client = HandshakeClient::new(fast_handshake_config());

    let outcome = client.perform(&peer.address()).await.unwrap();
    let keys: Vec<String> = outcome.addresses.iter().map(|a| a.key()).collect();

    // Duplicates and unroutable entries dropped
    assert_eq!(keys, vec!["10.20.0.1:22556", "[2001:db8::7]:22556"]);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let peer = StubPeer::spawn(StubPeerConfig {
        mode: StubMode::Silent,
        ..Default::default()
    })
    .await;
    let client = HandshakeClient::new(fast_handshake_config());

    let err = client.perform(&peer.address()).await.unwrap_err();
    assert!(matches!(err, NetworkError::Timeout(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_wrong_magic_rejected() {
    let peer = StubPeer::spawn(StubPeerConfig {
        mode: StubMode::WrongMagic,
        ..Default::default()
    })
    .await;
    let client = HandshakeClient::new(fast_handshake_config());

    let err = client.perform(&peer.address()).await.unwrap_err();
    assert!(matches!(err, NetworkError::MagicMismatch { .. }), "got {:?}", err);
    assert!(err.is_protocol_error());
}

#[tokio::test]
async fn test_no_getaddr_when_disabled() {
    let peer = StubPeer::with_addresses(vec![NodeAddress::parse("10.20.0.9", 22556).unwrap()]).await;
    let mut config = fast_handshake_config();
    config.request_addresses = false;

    let outcome = HandshakeClient::new(config)
        .perform(&peer.address())
        .await
        .unwrap();
    assert!(outcome.addresses.is_empty());
}
