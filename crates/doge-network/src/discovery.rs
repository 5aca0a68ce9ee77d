//! DNS seed resolution.
//!
//! Seeds answer with a rotating subset of reachable nodes, so each seed is
//! queried several times with a randomized pause in between. Addresses are
//! handed to the caller as soon as they are first seen rather than after the
//! last query.

use crate::{NetworkError, NetworkResult, NodeAddress};
use rand::Rng;
use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Blocking name lookup, run on the blocking pool.
pub trait HostResolver: Send + Sync + 'static {
    fn lookup(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn lookup(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        (host, port).to_socket_addrs().map(|iter| iter.collect())
    }
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Queries issued per seed.
    pub queries_per_seed: usize,
    /// Lower bound of the pause between queries to one seed.
    pub query_delay_min: Duration,
    /// Upper bound of the pause between queries to one seed.
    pub query_delay_max: Duration,
    /// Pause between seeds.
    pub seed_delay: Duration,
    /// Timeout of a single lookup.
    pub dns_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            queries_per_seed: 4,
            query_delay_min: Duration::from_millis(500),
            query_delay_max: Duration::from_millis(1500),
            seed_delay: Duration::from_secs(1),
            dns_timeout: Duration::from_secs(10),
        }
    }
}

/// DNS seed resolver.
#[derive(Clone)]
pub struct SeedResolver {
    resolver: Arc<dyn HostResolver>,
    config: ResolverConfig,
}

impl SeedResolver {
    /// Create a resolver using the system's DNS.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            resolver: Arc::new(SystemResolver),
            config,
        }
    }

    /// Swap the lookup backend.
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a seed once.
    pub async fn resolve(&self, seed: &str, port: u16) -> NetworkResult<Vec<NodeAddress>> {
        let resolver = Arc::clone(&self.resolver);
        let host = seed.to_string();

        let result = timeout(
            self.config.dns_timeout,
            tokio::task::spawn_blocking(move || resolver.lookup(&host, port)),
        )
        .await;

        let addrs = match result {
            Ok(Ok(Ok(addrs))) => addrs,
            Ok(Ok(Err(e))) => {
                return Err(NetworkError::Resolution {
                    host: seed.to_string(),
                    reason: e.to_string(),
                })
            }
            Ok(Err(e)) => {
                return Err(NetworkError::Resolution {
                    host: seed.to_string(),
                    reason: format!("task join error: {}", e),
                })
            }
            Err(_) => {
                return Err(NetworkError::Timeout(format!(
                    "DNS resolution of {} timed out",
                    seed
                )))
            }
        };

        Ok(addrs.into_iter().map(NodeAddress::from_socket_addr).collect())
    }

    /// Query one seed repeatedly, calling `on_new` for every address the first
    /// time it is seen. Failed queries are logged and skipped.
    pub async fn resolve_repeated<F>(&self, seed: &str, port: u16, mut on_new: F) -> Vec<NodeAddress>
    where
        F: FnMut(&NodeAddress) + Send,
    {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for attempt in 1..=self.config.queries_per_seed {
            match self.resolve(seed, port).await {
                Ok(addrs) => {
                    let before = found.len();
                    for addr in addrs {
                        if seen.insert(addr.key()) {
                            on_new(&addr);
                            found.push(addr);
                        }
                    }
                    debug!(
                        seed = %seed,
                        attempt,
                        new = found.len() - before,
                        "DNS query answered"
                    );
                }
                Err(e) => {
                    warn!(seed = %seed, attempt, error = %e, "DNS query failed");
                }
            }

            if attempt < self.config.queries_per_seed {
                tokio::time::sleep(self.query_delay()).await;
            }
        }

        found
    }

    /// Resolve every seed in turn.
    pub async fn resolve_all<F>(&self, seeds: &[String], port: u16, mut on_new: F) -> Vec<NodeAddress>
    where
        F: FnMut(&NodeAddress) + Send,
    {
        let mut seen = HashSet::new();
        let mut peers = Vec::new();

        for (i, seed) in seeds.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.seed_delay).await;
            }
            let found = self
                .resolve_repeated(seed, port, |addr| {
                    if !seen.contains(&addr.key()) {
                        on_new(addr);
                    }
                })
                .await;
            info!(seed = %seed, count = found.len(), "Resolved DNS seed");
            for addr in found {
                if seen.insert(addr.key()) {
                    peers.push(addr);
                }
            }
        }

        peers
    }

    /// Random pause between queries to the same seed.
    fn query_delay(&self) -> Duration {
        let min = self.config.query_delay_min.as_millis() as u64;
        let max = self.config.query_delay_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns queued answers in order; `None` entries fail.
    struct Scripted {
        answers: Mutex<Vec<Option<Vec<SocketAddr>>>>,
    }

    impl Scripted {
        fn new(mut answers: Vec<Option<Vec<SocketAddr>>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
            }
        }
    }

    impl HostResolver for Scripted {
        fn lookup(&self, _host: &str, _port: u16) -> std::io::Result<Vec<SocketAddr>> {
            match self.answers.lock().unwrap().pop() {
                Some(Some(addrs)) => Ok(addrs),
                _ => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no answer")),
            }
        }
    }

    fn instant_config(queries: usize) -> ResolverConfig {
        ResolverConfig {
            queries_per_seed: queries,
            query_delay_min: Duration::ZERO,
            query_delay_max: Duration::ZERO,
            seed_delay: Duration::ZERO,
            dns_timeout: Duration::from_secs(1),
        }
    }

    fn sock(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_repeated_queries_dedup_representations() {
        let scripted = Scripted::new(vec![
            Some(vec![sock("1.2.3.4:22556"), sock("5.6.7.8:22556")]),
            Some(vec![sock("[::ffff:1.2.3.4]:22556"), sock("9.9.9.9:22556")]),
        ]);
        let resolver = SeedResolver::new(instant_config(2)).with_resolver(Arc::new(scripted));

        let mut emitted = Vec::new();
        let found = resolver
            .resolve_repeated("seed.test", 22556, |a| emitted.push(a.key()))
            .await;

        assert_eq!(found.len(), 3);
        assert_eq!(emitted, vec!["1.2.3.4:22556", "5.6.7.8:22556", "9.9.9.9:22556"]);
    }

    #[tokio::test]
    async fn test_failed_query_does_not_abort() {
        let scripted = Scripted::new(vec![
            None,
            Some(vec![sock("1.2.3.4:22556")]),
            None,
        ]);
        let resolver = SeedResolver::new(instant_config(3)).with_resolver(Arc::new(scripted));

        let found = resolver.resolve_repeated("seed.test", 22556, |_| {}).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_all_dedups_across_seeds() {
        let scripted = Scripted::new(vec![
            Some(vec![sock("1.2.3.4:22556")]),
            Some(vec![sock("1.2.3.4:22556"), sock("4.3.2.1:22556")]),
        ]);
        let resolver = SeedResolver::new(instant_config(1)).with_resolver(Arc::new(scripted));

        let seeds = vec!["a.test".to_string(), "b.test".to_string()];
        let mut emitted = 0;
        let peers = resolver.resolve_all(&seeds, 22556, |_| emitted += 1).await;

        assert_eq!(peers.len(), 2);
        assert_eq!(emitted, 2);
    }

    #[tokio::test]
    async fn test_all_queries_fail() {
        let resolver =
            SeedResolver::new(instant_config(2)).with_resolver(Arc::new(Scripted::new(Vec::new())));
        let found = resolver.resolve_repeated("seed.test", 22556, |_| {}).await;
        assert!(found.is_empty());
    }
}
