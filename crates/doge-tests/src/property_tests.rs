//! Property-based tests using proptest.
//!
//! These tests check the catalog invariants and address normalization
//! against randomly generated inputs with shrinking support.

use crate::generators::{spellings, test_address};
use doge_catalog::{
    CatalogConfig, PeerCatalog, PeerRecord, PeerSource, PeerStatus, UpdateOutcome,
};
use doge_network::{
    put_compact_size, read_compact_size, HostResolver, NodeAddress, ResolverConfig, SeedResolver,
};
use proptest::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Strategies
// ============================================================================

/// Unix millis within a few weeks of a fixed instant.
fn arb_timestamp() -> impl Strategy<Value = u64> {
    1_700_000_000_000u64..1_700_000_000_000u64 + 30 * 24 * 3_600_000
}

fn arb_status() -> impl Strategy<Value = PeerStatus> {
    prop_oneof![
        Just(PeerStatus::Discovered),
        Just(PeerStatus::Online),
        Just(PeerStatus::Offline),
    ]
}

/// A record drawn from a small address space so keys collide often.
fn arb_record() -> impl Strategy<Value = PeerRecord> {
    (0u32..64, arb_timestamp(), arb_status(), any::<bool>(), any::<i32>()).prop_map(
        |(seed, last_seen, status, manual, height)| {
            let mut record = PeerRecord::discovered(test_address(seed), PeerSource::Dns, last_seen);
            record.status = status;
            record.manually_updated = manual;
            record.height = height;
            record
        },
    )
}

fn catalog(max_peers: usize) -> PeerCatalog {
    PeerCatalog::in_memory(CatalogConfig {
        max_peers,
        ..Default::default()
    })
}

// ============================================================================
// Catalog invariants
// ============================================================================

proptest! {
    #[test]
    fn prop_never_exceeds_capacity(
        max_peers in 1usize..16,
        records in prop::collection::vec(arb_record(), 0..120),
    ) {
        let catalog = catalog(max_peers);
        for record in records {
            catalog.add_or_update(record);
            prop_assert!(catalog.count() <= max_peers);
        }
    }

    #[test]
    fn prop_eviction_removes_stalest(
        records in prop::collection::vec(arb_record(), 1..60),
    ) {
        let catalog = catalog(8);
        for record in records {
            let before = catalog.get_all();
            if let UpdateOutcome::Inserted { evicted: Some(gone) } = catalog.add_or_update(record) {
                let oldest = before.iter().map(|r| r.last_seen).min().unwrap_or(0);
                let gone_seen = before
                    .iter()
                    .find(|r| r.key() == gone)
                    .map(|r| r.last_seen);
                prop_assert_eq!(gone_seen, Some(oldest));
            }
        }
    }

    #[test]
    fn prop_manual_records_protected(
        seed in 0u32..64,
        background in prop::collection::vec(arb_record(), 0..30),
        height in any::<i32>(),
    ) {
        let catalog = catalog(1000);
        let mut manual = PeerRecord::discovered(test_address(seed), PeerSource::Manual, 1);
        manual.status = PeerStatus::Online;
        manual.manually_updated = true;
        manual.height = height;
        catalog.add_or_update(manual.clone());

        for mut record in background {
            record.address = test_address(seed);
            record.manually_updated = false;
            prop_assert_eq!(catalog.add_or_update(record), UpdateOutcome::Protected);
        }
        prop_assert_eq!(catalog.get(&test_address(seed)), Some(manual));
    }

    #[test]
    fn prop_sweep_idempotent(
        records in prop::collection::vec(arb_record(), 0..40),
        now in arb_timestamp(),
    ) {
        let catalog = catalog(1000);
        for record in records {
            catalog.add_or_update(record);
        }

        catalog.status_sweep_at(now);
        let mut first = catalog.get_all();
        prop_assert_eq!(catalog.status_sweep_at(now), 0);
        let mut second = catalog.get_all();

        first.sort_by_key(|r| r.key());
        second.sort_by_key(|r| r.key());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_sweep_never_deletes(
        records in prop::collection::vec(arb_record(), 0..40),
        now in arb_timestamp(),
    ) {
        let catalog = catalog(1000);
        for record in records {
            catalog.add_or_update(record);
        }
        let count = catalog.count();
        catalog.status_sweep_at(now + 365 * 24 * 3_600_000);
        prop_assert_eq!(catalog.count(), count);
        prop_assert_eq!(catalog.online_count(), 0);
    }
}

// ============================================================================
// Address normalization
// ============================================================================

proptest! {
    #[test]
    fn prop_spellings_share_a_key(
        a in 1u8..=223, b in any::<u8>(), c in any::<u8>(), d in any::<u8>(),
        port in 1u16..,
    ) {
        let keys: Vec<String> = spellings(a, b, c, d, port)
            .iter()
            .map(|s| NodeAddress::parse(s, 22556).unwrap().key())
            .collect();
        prop_assert!(keys.windows(2).all(|w| w[0] == w[1]), "{:?}", keys);
    }

    #[test]
    fn prop_compact_size_round_trip(value in any::<u64>()) {
        let mut buf = Vec::new();
        put_compact_size(&mut buf, value);
        let mut slice = &buf[..];
        prop_assert_eq!(read_compact_size(&mut slice).unwrap(), value);
        prop_assert!(slice.is_empty());
    }
}

/// Answers every lookup with the same host in both IPv4 and IPv4-mapped form.
struct DoubleSpelled(Vec<SocketAddr>);

impl HostResolver for DoubleSpelled {
    fn lookup(&self, _host: &str, _port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_resolving_twice_does_not_duplicate() {
    let answers: Vec<SocketAddr> = ["1.2.3.4:22556", "[::ffff:1.2.3.4]:22556", "5.6.7.8:22556"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    let resolver = SeedResolver::new(ResolverConfig {
        queries_per_seed: 2,
        query_delay_min: Duration::ZERO,
        query_delay_max: Duration::ZERO,
        seed_delay: Duration::ZERO,
        dns_timeout: Duration::from_secs(1),
    })
    .with_resolver(Arc::new(DoubleSpelled(answers)));

    let catalog = catalog(1000);
    let seeds = vec!["seed.example.org".to_string(), "seed.example.org".to_string()];
    resolver
        .resolve_all(&seeds, 22556, |addr| {
            catalog.register_discovered(addr, PeerSource::Dns);
        })
        .await;

    assert_eq!(catalog.count(), 2);
    assert!(catalog.exists_by_address("::ffff:1.2.3.4", 22556));
    assert!(catalog.exists_by_address("1.2.3.4", 22556));
}
