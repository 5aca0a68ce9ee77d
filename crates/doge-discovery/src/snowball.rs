//! Snowball amplification.
//!
//! DNS seeds only ever hand out a small rotating slice of the network. The
//! amplifier widens it by asking reachable peers for their address books:
//!
//! 1. Pick up to `peers_per_round` candidates that have not been queried in
//!    this run: addresses found by the previous round first, then Online
//!    peers from the catalog.
//! 2. Handshake with each and request its addresses.
//! 3. Every address not already known is registered in the catalog right away
//!    (Discovered, source "Snowball Round N") and becomes a candidate for the
//!    next round.
//!
//! The run stops after `max_rounds`, or early once a round finds nothing new.

use crate::prober::{probe_batch, record_handshake, AddressProber};
use crate::WorkerPool;
use doge_catalog::{PeerCatalog, PeerSource, PeerStatus};
use doge_network::NodeAddress;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Snowball configuration.
#[derive(Debug, Clone)]
pub struct SnowballConfig {
    /// Upper bound on rounds.
    pub max_rounds: u32,
    /// Peers queried per round.
    pub peers_per_round: usize,
    /// Pause between rounds.
    pub round_delay: Duration,
}

impl Default for SnowballConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            peers_per_round: 10,
            round_delay: Duration::from_secs(2),
        }
    }
}

/// Summary of one amplifier run.
#[derive(Debug, Clone, Default)]
pub struct SnowballReport {
    /// Rounds that issued queries.
    pub rounds: u32,
    /// Peers queried across all rounds.
    pub queried: usize,
    /// Peers that answered the handshake.
    pub responded: usize,
    /// Addresses that were new to the catalog.
    pub discovered: Vec<NodeAddress>,
}

/// Multi-round peer amplifier.
pub struct SnowballAmplifier {
    config: SnowballConfig,
    catalog: Arc<PeerCatalog>,
    prober: Arc<dyn AddressProber>,
    pool: WorkerPool,
}

impl SnowballAmplifier {
    pub fn new(
        config: SnowballConfig,
        catalog: Arc<PeerCatalog>,
        prober: Arc<dyn AddressProber>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            config,
            catalog,
            prober,
            pool,
        }
    }

    /// Run the amplifier to completion.
    pub async fn run(&self) -> SnowballReport {
        let mut report = SnowballReport::default();
        let mut queried: HashSet<String> = HashSet::new();
        let mut carried: Vec<NodeAddress> = Vec::new();

        for round in 1..=self.config.max_rounds {
            let candidates = self.select_candidates(&carried, &queried);
            if candidates.is_empty() {
                debug!(round, "No snowball candidates left");
                break;
            }
            if round > 1 && !self.config.round_delay.is_zero() {
                tokio::time::sleep(self.config.round_delay).await;
            }

            info!(round, candidates = candidates.len(), "Snowball round started");
            for candidate in &candidates {
                queried.insert(candidate.key());
                self.catalog.mark_attempt(candidate);
            }
            report.rounds = round;
            report.queried += candidates.len();

            let mut fresh = Vec::new();
            let mut results = probe_batch(&self.pool, &self.prober, candidates).await;
            while let Some((peer, result)) = results.next().await {
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Snowball query failed");
                        continue;
                    }
                };
                report.responded += 1;
                record_handshake(&self.catalog, &outcome, PeerSource::Snowball(round), false);

                for addr in outcome.addresses {
                    if queried.contains(&addr.key()) {
                        continue;
                    }
                    if self
                        .catalog
                        .register_discovered(&addr, PeerSource::Snowball(round))
                    {
                        fresh.push(addr);
                    }
                }
            }

            info!(round, new = fresh.len(), "Snowball round complete");
            if fresh.is_empty() {
                break;
            }
            report.discovered.extend(fresh.iter().cloned());
            carried = fresh;
        }

        info!(
            rounds = report.rounds,
            queried = report.queried,
            discovered = report.discovered.len(),
            "Snowball finished"
        );
        report
    }

    /// Addresses carried from the last round first, then Online peers, most
    /// recently seen first.
    fn select_candidates(
        &self,
        carried: &[NodeAddress],
        queried: &HashSet<String>,
    ) -> Vec<NodeAddress> {
        let limit = self.config.peers_per_round;
        let mut picked: HashSet<String> = HashSet::new();
        let mut candidates = Vec::with_capacity(limit);

        for addr in carried {
            if candidates.len() >= limit {
                return candidates;
            }
            let key = addr.key();
            if !queried.contains(&key) && picked.insert(key) {
                candidates.push(addr.clone());
            }
        }

        let mut online = self.catalog.get_by_status(PeerStatus::Online);
        online.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        for record in online {
            if candidates.len() >= limit {
                break;
            }
            let key = record.key();
            if !queried.contains(&key) && picked.insert(key) {
                candidates.push(record.address);
            }
        }

        candidates
    }
}
