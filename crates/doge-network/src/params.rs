//! Network parameters.
//!
//! The hosting application hands discovery a [`NetworkParams`] describing the
//! chain it lives on: wire magic, default port, address version byte, the DNS
//! seeds to query and a small fallback list used when every seed comes back empty.

use crate::{NodeAddress, MAINNET_MAGIC, TESTNET_MAGIC};

/// Dogecoin mainnet DNS seeds.
pub const MAINNET_DNS_SEEDS: &[&str] = &["seed.multidoge.org", "seed2.multidoge.org"];

/// Dogecoin testnet DNS seeds.
pub const TESTNET_DNS_SEEDS: &[&str] = &["testseed.jrn.me.uk"];

/// Fallback mainnet peers, dialed by name when the seeds yield nothing.
pub const MAINNET_FALLBACK_PEERS: &[&str] = &[
    "seed.dogecoin.com:22556",
    "seed.mophides.com:22556",
    "seed.dglibrary.org:22556",
    "seed.dogechain.info:22556",
];

/// Fallback testnet peers.
pub const TESTNET_FALLBACK_PEERS: &[&str] = &["testseed.jrn.me.uk:44556"];

/// Network type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Mainnet,
    Testnet,
}

impl NetworkType {
    /// Parse a network name as used in config files and on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Some(NetworkType::Mainnet),
            "testnet" | "test" => Some(NetworkType::Testnet),
            _ => None,
        }
    }

    pub fn params(&self) -> NetworkParams {
        match self {
            NetworkType::Mainnet => NetworkParams::mainnet(),
            NetworkType::Testnet => NetworkParams::testnet(),
        }
    }
}

/// Parameters of the network discovery runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    /// Human readable name.
    pub name: String,
    /// Magic bytes opening every message header.
    pub magic: [u8; 4],
    /// Default P2P port.
    pub default_port: u16,
    /// Version byte of pay-to-pubkey-hash addresses.
    pub address_version: u8,
    /// DNS seed host names.
    pub dns_seeds: Vec<String>,
    /// Fallback peers in `host:port` form.
    pub fallback_peers: Vec<String>,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            magic: MAINNET_MAGIC,
            default_port: 22556,
            address_version: 30,
            dns_seeds: MAINNET_DNS_SEEDS.iter().map(|s| s.to_string()).collect(),
            fallback_peers: MAINNET_FALLBACK_PEERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            name: "testnet".to_string(),
            magic: TESTNET_MAGIC,
            default_port: 44556,
            address_version: 113,
            dns_seeds: TESTNET_DNS_SEEDS.iter().map(|s| s.to_string()).collect(),
            fallback_peers: TESTNET_FALLBACK_PEERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Fallback peers that parse; malformed entries are dropped.
    pub fn fallback_addresses(&self) -> Vec<NodeAddress> {
        self.fallback_peers
            .iter()
            .filter_map(|peer| NodeAddress::parse(peer, self.default_port).ok())
            .collect()
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::mainnet()
    }
}
