//! Test data generators for integration tests.
//!
//! Provides addresses and peer records in a few predictable shapes.

use doge_catalog::{PeerRecord, PeerSource, PeerStatus};
use doge_network::{Host, NodeAddress, DEFAULT_PORT};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Global counter for unique address generation
static ADDRESS_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Deterministic mainnet address in 10.0.0.0/8 for a seed.
pub fn test_address(seed: u32) -> NodeAddress {
    let [_, b, c, d] = seed.to_be_bytes();
    NodeAddress::new(Host::Ipv4(Ipv4Addr::new(10, b, c, d)), DEFAULT_PORT)
}

/// Address that no other call in this process returns.
pub fn unique_address() -> NodeAddress {
    let seed = ADDRESS_COUNTER.fetch_add(1, Ordering::SeqCst);
    let [_, b, c, d] = seed.to_be_bytes();
    NodeAddress::new(Host::Ipv4(Ipv4Addr::new(172, 16 | (b & 0x0f), c, d)), DEFAULT_PORT)
}

/// `count` consecutive deterministic addresses starting at `first`.
pub fn test_addresses(first: u32, count: u32) -> Vec<NodeAddress> {
    (first..first + count).map(test_address).collect()
}

/// Discovered record for a seed, last seen at `last_seen`.
pub fn test_record(seed: u32, last_seen: u64) -> PeerRecord {
    let mut record = PeerRecord::discovered(test_address(seed), PeerSource::Dns, last_seen);
    record.last_seen = last_seen;
    record
}

/// Online record for a seed, as a completed handshake would leave it.
pub fn online_record(seed: u32, last_seen: u64) -> PeerRecord {
    let mut record = test_record(seed, last_seen);
    record.status = PeerStatus::Online;
    record.version = 70015;
    record.user_agent = "/Shibetoshi:1.14.6/".to_string();
    record.services = 1;
    record.height = 5_000_000;
    record.latency_ms = 42;
    record
}

/// The same IPv4 endpoint spelled every way the resolver or a peer might.
pub fn spellings(a: u8, b: u8, c: u8, d: u8, port: u16) -> Vec<String> {
    vec![
        format!("{}.{}.{}.{}:{}", a, b, c, d, port),
        format!("[::ffff:{}.{}.{}.{}]:{}", a, b, c, d, port),
        format!(
            "[::ffff:{:02x}{:02x}:{:02x}{:02x}]:{}",
            a, b, c, d, port
        ),
    ]
}
