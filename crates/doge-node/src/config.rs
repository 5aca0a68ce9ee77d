//! Node configuration.

use crate::Args;
use anyhow::{Context, Result};
use doge_catalog::{CatalogConfig, MAX_PEERS, OFFLINE_THRESHOLD, REMOVAL_THRESHOLD};
use doge_discovery::{DiscoveryConfig, PoolConfig, SnowballConfig};
use doge_network::{HandshakeConfig, NetworkParams, NetworkType, ResolverConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name.
    pub node_name: String,
    /// Network (mainnet, testnet).
    pub network: String,
    /// Data directory; holds the peer snapshot.
    pub data_dir: PathBuf,
    /// DNS seeds. Empty means the network's built-in list.
    #[serde(default)]
    pub dns_seeds: Vec<String>,
    /// Fallback peers. Empty means the network's built-in list.
    #[serde(default)]
    pub fallback_peers: Vec<String>,
    /// Handshake configuration.
    #[serde(default)]
    pub handshake: HandshakeSection,
    /// DNS configuration.
    #[serde(default)]
    pub dns: DnsSection,
    /// Catalog configuration.
    #[serde(default)]
    pub catalog: CatalogSection,
    /// Discovery scheduling.
    #[serde(default)]
    pub discovery: DiscoverySection,
}

/// Handshake configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeSection {
    pub connect_timeout_secs: u64,
    pub version_timeout_secs: u64,
    pub addr_timeout_secs: u64,
    /// Ask peers for their address books.
    pub request_addresses: bool,
    /// User agent we announce; empty means the built-in one.
    pub user_agent: String,
}

impl Default for HandshakeSection {
    fn default() -> Self {
        let defaults = HandshakeConfig::default();
        Self {
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            version_timeout_secs: defaults.version_timeout.as_secs(),
            addr_timeout_secs: defaults.addr_timeout.as_secs(),
            request_addresses: defaults.request_addresses,
            user_agent: String::new(),
        }
    }
}

/// DNS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSection {
    /// Queries per seed, spaced out to catch rotation.
    pub queries_per_seed: usize,
    pub query_delay_min_ms: u64,
    pub query_delay_max_ms: u64,
    pub timeout_secs: u64,
}

impl Default for DnsSection {
    fn default() -> Self {
        let defaults = ResolverConfig::default();
        Self {
            queries_per_seed: defaults.queries_per_seed,
            query_delay_min_ms: defaults.query_delay_min.as_millis() as u64,
            query_delay_max_ms: defaults.query_delay_max.as_millis() as u64,
            timeout_secs: defaults.dns_timeout.as_secs(),
        }
    }
}

/// Catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub max_peers: usize,
    pub offline_after_hours: u64,
    pub remove_after_days: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            max_peers: MAX_PEERS,
            offline_after_hours: OFFLINE_THRESHOLD.as_secs() / 3600,
            remove_after_days: REMOVAL_THRESHOLD.as_secs() / 86_400,
        }
    }
}

/// Discovery scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Concurrent handshakes.
    pub workers: usize,
    /// Handshakes allowed to queue behind the workers.
    pub queue_capacity: usize,
    pub max_handshakes_per_cycle: usize,
    pub min_online_peers: usize,
    pub snowball_rounds: u32,
    pub snowball_peers_per_round: usize,
    pub rediscovery_interval_mins: u64,
    pub sweep_interval_hours: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let defaults = DiscoveryConfig::default();
        Self {
            workers: defaults.pool.workers,
            queue_capacity: defaults.pool.queue_capacity,
            max_handshakes_per_cycle: defaults.max_handshakes_per_cycle,
            min_online_peers: defaults.min_online_peers,
            snowball_rounds: defaults.snowball.max_rounds,
            snowball_peers_per_round: defaults.snowball.peers_per_round,
            rediscovery_interval_mins: defaults.rediscovery_interval.as_secs() / 60,
            sweep_interval_hours: defaults.sweep_interval.as_secs() / 3600,
        }
    }
}

impl NodeConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default_for_network(&args.network)
        };

        // Override with CLI args
        if let Some(ref data_dir) = args.data_dir {
            config.data_dir = data_dir.clone();
        }
        config.network = args.network.clone();

        Ok(config)
    }

    /// Create default config for a network.
    pub fn default_for_network(network: &str) -> Self {
        let data_dir = match network {
            "testnet" => PathBuf::from(".doge-testnet"),
            _ => PathBuf::from(".doge"),
        };

        Self {
            node_name: "doge-node".to_string(),
            network: network.to_string(),
            data_dir,
            dns_seeds: Vec::new(),
            fallback_peers: Vec::new(),
            handshake: HandshakeSection::default(),
            dns: DnsSection::default(),
            catalog: CatalogSection::default(),
            discovery: DiscoverySection::default(),
        }
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Network parameters, with configured seed lists taking precedence.
    pub fn network_params(&self) -> Result<NetworkParams> {
        let network = NetworkType::from_name(&self.network)
            .with_context(|| format!("Unknown network '{}'", self.network))?;
        let mut params = network.params();
        if !self.dns_seeds.is_empty() {
            params.dns_seeds = self.dns_seeds.clone();
        }
        if !self.fallback_peers.is_empty() {
            params.fallback_peers = self.fallback_peers.clone();
        }
        Ok(params)
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            max_peers: self.catalog.max_peers,
            offline_threshold: Duration::from_secs(self.catalog.offline_after_hours * 3600),
            removal_threshold: Duration::from_secs(self.catalog.remove_after_days * 86_400),
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        let defaults = DiscoveryConfig::default();

        let mut handshake = HandshakeConfig {
            connect_timeout: Duration::from_secs(self.handshake.connect_timeout_secs),
            version_timeout: Duration::from_secs(self.handshake.version_timeout_secs),
            addr_timeout: Duration::from_secs(self.handshake.addr_timeout_secs),
            request_addresses: self.handshake.request_addresses,
            ..defaults.handshake
        };
        if !self.handshake.user_agent.is_empty() {
            handshake.user_agent = self.handshake.user_agent.clone();
        }

        DiscoveryConfig {
            handshake,
            resolver: ResolverConfig {
                queries_per_seed: self.dns.queries_per_seed,
                query_delay_min: Duration::from_millis(self.dns.query_delay_min_ms),
                query_delay_max: Duration::from_millis(self.dns.query_delay_max_ms),
                dns_timeout: Duration::from_secs(self.dns.timeout_secs),
                ..defaults.resolver
            },
            pool: PoolConfig {
                workers: self.discovery.workers,
                queue_capacity: self.discovery.queue_capacity,
            },
            snowball: SnowballConfig {
                max_rounds: self.discovery.snowball_rounds,
                peers_per_round: self.discovery.snowball_peers_per_round,
                ..defaults.snowball
            },
            max_handshakes_per_cycle: self.discovery.max_handshakes_per_cycle,
            min_online_peers: self.discovery.min_online_peers,
            rediscovery_interval: Duration::from_secs(self.discovery.rediscovery_interval_mins * 60),
            sweep_interval: Duration::from_secs(self.discovery.sweep_interval_hours * 3600),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default_for_network("mainnet");
        assert_eq!(config.network, "mainnet");
        let params = config.network_params().unwrap();
        assert_eq!(params.default_port, 22556);
        assert!(!params.dns_seeds.is_empty());
    }

    #[test]
    fn test_testnet_config() {
        let config = NodeConfig::default_for_network("testnet");
        assert!(config.data_dir.to_string_lossy().contains("testnet"));
        assert_eq!(config.network_params().unwrap().default_port, 44556);
    }

    #[test]
    fn test_unknown_network() {
        let config = NodeConfig::default_for_network("regtest");
        assert!(config.network_params().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            node_name = "shibe"
            network = "mainnet"
            data_dir = "/tmp/doge"
            dns_seeds = ["seed.example.org"]

            [discovery]
            workers = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery.workers, 2);
        assert_eq!(config.discovery.queue_capacity, DiscoverySection::default().queue_capacity);
        assert_eq!(config.catalog.max_peers, MAX_PEERS);
        assert_eq!(config.network_params().unwrap().dns_seeds, vec!["seed.example.org"]);

        let discovery = config.discovery_config();
        assert_eq!(discovery.pool.workers, 2);
        assert_eq!(discovery.handshake.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doge-node.toml");
        let config = NodeConfig::default_for_network("testnet");
        config.save(&path).unwrap();

        let loaded: NodeConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.network, "testnet");
        assert_eq!(loaded.catalog.offline_after_hours, 48);
        assert_eq!(loaded.catalog.remove_after_days, 7);
        assert_eq!(loaded.catalog_config().offline_threshold, OFFLINE_THRESHOLD);
    }
}
