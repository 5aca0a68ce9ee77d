//! # doge-network
//!
//! Wire-level networking for Dogecoin peer discovery.
//!
//! This crate provides:
//! - Peer addresses with canonical deduplication keys
//! - Message framing (magic, command, length, checksum)
//! - version/verack/getaddr/addr payloads
//! - A handshake client driving raw TCP sockets
//! - DNS seed resolution

mod address;
mod codec;
pub mod discovery;
mod error;
mod handshake;
mod message;
mod params;

pub use address::{Host, NodeAddress, ONION_SUFFIX};
pub use codec::{
    checksum, double_sha256, put_compact_size, read_compact_size, MessageCodec, COMMAND_SIZE,
    HEADER_SIZE,
};
pub use discovery::{HostResolver, ResolverConfig, SeedResolver, SystemResolver};
pub use error::{NetworkError, NetworkResult};
pub use handshake::{HandshakeClient, HandshakeConfig, HandshakeOutcome, PeerVersion};
pub use message::{
    services_text, AddrEntry, Message, NetAddr, VersionMessage, MAX_ADDR_ENTRIES,
    MAX_USER_AGENT_LEN, NODE_NETWORK,
};
pub use params::{
    NetworkParams, NetworkType, MAINNET_DNS_SEEDS, MAINNET_FALLBACK_PEERS, TESTNET_DNS_SEEDS,
    TESTNET_FALLBACK_PEERS,
};

/// Default mainnet P2P port.
pub const DEFAULT_PORT: u16 = 22556;

/// Protocol magic bytes for mainnet.
pub const MAINNET_MAGIC: [u8; 4] = [0xc0, 0xc0, 0xc0, 0xc0];

/// Protocol magic bytes for testnet.
pub const TESTNET_MAGIC: [u8; 4] = [0xfc, 0xc1, 0xb7, 0xdc];

/// Maximum payload size.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024; // 4 MB

/// Protocol version we speak.
pub const PROTOCOL_VERSION: i32 = 70015;

/// User agent announced in our version message.
pub const USER_AGENT: &str = concat!("/doge-node:", env!("CARGO_PKG_VERSION"), "/");
