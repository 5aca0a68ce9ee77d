//! Running handshakes and folding their results into the catalog.

use crate::WorkerPool;
use doge_catalog::{now_millis, PeerCatalog, PeerRecord, PeerSource, UpdateOutcome};
use doge_network::{HandshakeClient, HandshakeOutcome, NetworkError, NetworkResult, NodeAddress};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::FutureExt;
use std::sync::Arc;
use tracing::warn;

/// Something that can handshake with a peer and report what it learned.
pub trait AddressProber: Send + Sync + 'static {
    fn probe(&self, addr: NodeAddress) -> BoxFuture<'static, NetworkResult<HandshakeOutcome>>;
}

impl AddressProber for HandshakeClient {
    fn probe(&self, addr: NodeAddress) -> BoxFuture<'static, NetworkResult<HandshakeOutcome>> {
        let client = self.clone();
        async move { client.perform(&addr).await }.boxed()
    }
}

/// Probe results, yielded as they complete.
pub type ProbeResults = FuturesUnordered<BoxFuture<'static, (NodeAddress, NetworkResult<HandshakeOutcome>)>>;

/// Submit one probe per address to the pool.
///
/// Submission waits for pool slots; if the pool shuts down midway the
/// remaining addresses are dropped.
pub async fn probe_batch(
    pool: &WorkerPool,
    prober: &Arc<dyn AddressProber>,
    addrs: Vec<NodeAddress>,
) -> ProbeResults {
    let results = FuturesUnordered::new();
    for addr in addrs {
        let probe = prober.probe(addr.clone());
        let handle = match pool.submit(probe).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Stopped submitting probes");
                break;
            }
        };
        results.push(
            async move {
                let result = match handle.await {
                    Ok(Some(result)) => result,
                    Ok(None) => Err(NetworkError::HandshakeFailed(
                        "worker pool shut down".to_string(),
                    )),
                    Err(e) => Err(NetworkError::HandshakeFailed(format!("worker failed: {}", e))),
                };
                (addr, result)
            }
            .boxed(),
        );
    }
    results
}

/// Build the Online record for a completed handshake.
///
/// An existing record keeps its source and discovery time; a new one is
/// tagged with `source`.
pub fn online_record(
    catalog: &PeerCatalog,
    outcome: &HandshakeOutcome,
    source: PeerSource,
    manual: bool,
) -> PeerRecord {
    let now = now_millis();
    let mut record = match catalog.get(&outcome.peer) {
        Some(mut existing) => {
            existing.apply_handshake(&outcome.info, now);
            existing
        }
        None => PeerRecord::online(outcome.peer.clone(), &outcome.info, source, now),
    };
    record.manually_updated = manual;
    record
}

/// Store a completed handshake in the catalog.
pub fn record_handshake(
    catalog: &PeerCatalog,
    outcome: &HandshakeOutcome,
    source: PeerSource,
    manual: bool,
) -> (PeerRecord, UpdateOutcome) {
    let record = online_record(catalog, outcome, source, manual);
    let update = catalog.add_or_update(record.clone());
    (record, update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoolConfig;
    use doge_catalog::{CatalogConfig, PeerStatus};
    use doge_network::PeerVersion;
    use futures::StreamExt;

    struct Echo;

    impl AddressProber for Echo {
        fn probe(&self, addr: NodeAddress) -> BoxFuture<'static, NetworkResult<HandshakeOutcome>> {
            async move {
                if addr.port == 1 {
                    return Err(NetworkError::Timeout("test".to_string()));
                }
                Ok(HandshakeOutcome {
                    peer: addr,
                    info: version(),
                    addresses: Vec::new(),
                })
            }
            .boxed()
        }
    }

    fn version() -> PeerVersion {
        PeerVersion {
            version: 70015,
            user_agent: "/Shibetoshi:1.14.6/".to_string(),
            services: 1,
            start_height: 10,
            relay: true,
            latency_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_probe_batch_yields_every_address() {
        let pool = WorkerPool::new(PoolConfig::default());
        let prober: Arc<dyn AddressProber> = Arc::new(Echo);
        let addrs = vec![
            NodeAddress::parse("10.0.0.1:22556", 22556).unwrap(),
            NodeAddress::parse("10.0.0.2:1", 22556).unwrap(),
        ];

        let results: Vec<_> = probe_batch(&pool, &prober, addrs).await.collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 1);
    }

    #[test]
    fn test_record_keeps_existing_source() {
        let catalog = PeerCatalog::in_memory(CatalogConfig::default());
        let addr = NodeAddress::parse("10.0.0.3:22556", 22556).unwrap();
        catalog.register_discovered(&addr, PeerSource::Dns);

        let outcome = HandshakeOutcome {
            peer: addr.clone(),
            info: version(),
            addresses: Vec::new(),
        };
        let (record, update) = record_handshake(&catalog, &outcome, PeerSource::Snowball(1), false);

        assert_eq!(update, UpdateOutcome::Updated);
        assert_eq!(record.source, PeerSource::Dns);
        assert_eq!(catalog.get(&addr).unwrap().status, PeerStatus::Online);
        assert_eq!(catalog.get(&addr).unwrap().user_agent, "/Shibetoshi:1.14.6/");
    }
}
