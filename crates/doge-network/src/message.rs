//! Dogecoin P2P protocol messages.
//!
//! Only the messages discovery needs are modelled: the version/verack handshake,
//! the getaddr/addr address exchange, and ping/pong so a chatty peer can be kept
//! happy while we wait. Anything else decodes to [`Message::Unknown`] and is skipped.

use crate::codec::{put_compact_size, read_compact_size};
use crate::{NetworkError, NetworkResult, NodeAddress};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of entries read from one addr message.
pub const MAX_ADDR_ENTRIES: usize = 1000;

/// Maximum accepted user agent length.
pub const MAX_USER_AGENT_LEN: usize = 256;

/// Service bit: node serves the full block chain.
pub const NODE_NETWORK: u64 = 1;

/// Known service bits and their display names.
const SERVICE_NAMES: &[(u64, &str)] = &[
    (1 << 0, "NETWORK"),
    (1 << 1, "GETUTXO"),
    (1 << 2, "BLOOM"),
    (1 << 3, "WITNESS"),
    (1 << 4, "XTHIN"),
    (1 << 6, "COMPACT_FILTERS"),
    (1 << 10, "NETWORK_LIMITED"),
];

/// Render a service bitmask as a comma separated list of names.
pub fn services_text(services: u64) -> String {
    if services == 0 {
        return "NONE".to_string();
    }
    let mut names = Vec::new();
    let mut remaining = services;
    for (bit, name) in SERVICE_NAMES {
        if services & bit != 0 {
            names.push(name.to_string());
            remaining &= !bit;
        }
    }
    if remaining != 0 {
        names.push(format!("0x{:x}", remaining));
    }
    names.join(", ")
}

fn ensure(buf: &Bytes, needed: usize, what: &str) -> NetworkResult<()> {
    if buf.remaining() < needed {
        return Err(NetworkError::InvalidMessage(format!(
            "{} truncated: need {} bytes, have {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Seconds since the unix epoch.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Network address block without timestamp (26 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr {
    pub services: u64,
    /// IPv6, or IPv4-mapped IPv6.
    pub ip: [u8; 16],
    /// Port, big-endian on the wire.
    pub port: u16,
}

impl NetAddr {
    pub const SIZE: usize = 26;

    pub fn new(addr: &NodeAddress, services: u64) -> Self {
        Self {
            services,
            ip: addr.wire_ip(),
            port: addr.port,
        }
    }

    /// The unspecified address, used for our own sender block.
    pub fn unspecified(services: u64) -> Self {
        Self {
            services,
            ip: [0u8; 16],
            port: 0,
        }
    }

    pub fn node_address(&self) -> NodeAddress {
        NodeAddress::from_wire(self.ip, self.port)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.services);
        buf.put_slice(&self.ip);
        buf.put_u16(self.port);
    }

    fn decode(buf: &mut Bytes) -> NetworkResult<Self> {
        ensure(buf, Self::SIZE, "network address")?;
        let services = buf.get_u64_le();
        let mut ip = [0u8; 16];
        buf.copy_to_slice(&mut ip);
        let port = buf.get_u16();
        Ok(Self { services, ip, port })
    }
}

/// One entry of an addr message (30 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrEntry {
    /// Last time the advertising peer saw this address (unix seconds).
    pub timestamp: u32,
    pub addr: NetAddr,
}

impl AddrEntry {
    pub const SIZE: usize = 30;

    pub fn new(addr: &NodeAddress, services: u64, timestamp: u32) -> Self {
        Self {
            timestamp,
            addr: NetAddr::new(addr, services),
        }
    }
}

/// Version message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    /// Unix seconds.
    pub timestamp: i64,
    pub receiver: NetAddr,
    pub sender: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl VersionMessage {
    /// Build the version message we open a connection with.
    pub fn new(
        receiver: &NodeAddress,
        services: u64,
        user_agent: impl Into<String>,
        start_height: i32,
        nonce: u64,
    ) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            services,
            timestamp: unix_now(),
            receiver: NetAddr::new(receiver, NODE_NETWORK),
            sender: NetAddr::unspecified(services),
            nonce,
            user_agent: user_agent.into(),
            start_height,
            relay: false,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.version);
        buf.put_u64_le(self.services);
        buf.put_i64_le(self.timestamp);
        self.receiver.encode(buf);
        self.sender.encode(buf);
        buf.put_u64_le(self.nonce);
        let agent = self.user_agent.as_bytes();
        let agent = &agent[..agent.len().min(MAX_USER_AGENT_LEN)];
        put_compact_size(buf, agent.len() as u64);
        buf.put_slice(agent);
        buf.put_i32_le(self.start_height);
        buf.put_u8(self.relay as u8);
    }

    fn decode(mut buf: Bytes) -> NetworkResult<Self> {
        ensure(&buf, 4 + 8 + 8, "version")?;
        let version = buf.get_i32_le();
        let services = buf.get_u64_le();
        let timestamp = buf.get_i64_le();
        let receiver = NetAddr::decode(&mut buf)?;
        let sender = NetAddr::decode(&mut buf)?;
        ensure(&buf, 8, "version nonce")?;
        let nonce = buf.get_u64_le();

        let agent_len = read_compact_size(&mut buf)? as usize;
        if agent_len > MAX_USER_AGENT_LEN {
            return Err(NetworkError::InvalidMessage(format!(
                "User agent too long: {} bytes",
                agent_len
            )));
        }
        ensure(&buf, agent_len, "user agent")?;
        let user_agent = String::from_utf8_lossy(&buf.copy_to_bytes(agent_len)).into_owned();

        ensure(&buf, 4, "start height")?;
        let start_height = buf.get_i32_le();
        // Relay flag is absent in payloads from old peers
        let relay = if buf.has_remaining() {
            buf.get_u8() != 0
        } else {
            true
        };

        Ok(Self {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

/// P2P message types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    GetAddr,
    Addr(Vec<AddrEntry>),
    Ping(u64),
    Pong(u64),
    /// Any command we do not interpret.
    Unknown { command: String, payload: Bytes },
}

impl Message {
    /// Command name as written in the header.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Unknown { command, .. } => command,
        }
    }

    /// Serialize the payload (without header).
    pub fn encode_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::Version(version) => version.encode(&mut buf),
            Message::Verack | Message::GetAddr => {}
            Message::Addr(entries) => {
                put_compact_size(&mut buf, entries.len() as u64);
                for entry in entries {
                    buf.put_u32_le(entry.timestamp);
                    entry.addr.encode(&mut buf);
                }
            }
            Message::Ping(nonce) | Message::Pong(nonce) => buf.put_u64_le(*nonce),
            Message::Unknown { payload, .. } => buf.put_slice(payload),
        }
        buf.freeze()
    }

    /// Deserialize a payload for the given command.
    pub fn decode(command: &str, payload: Bytes) -> NetworkResult<Self> {
        match command {
            "version" => VersionMessage::decode(payload).map(Message::Version),
            "verack" => Ok(Message::Verack),
            "getaddr" => Ok(Message::GetAddr),
            "addr" => decode_addr(payload).map(Message::Addr),
            "ping" => Ok(Message::Ping(read_nonce(payload))),
            "pong" => Ok(Message::Pong(read_nonce(payload))),
            _ => Ok(Message::Unknown {
                command: command.to_string(),
                payload,
            }),
        }
    }
}

fn read_nonce(mut payload: Bytes) -> u64 {
    if payload.remaining() >= 8 {
        payload.get_u64_le()
    } else {
        0
    }
}

fn decode_addr(mut buf: Bytes) -> NetworkResult<Vec<AddrEntry>> {
    let declared = read_compact_size(&mut buf)?;
    let count = (declared as usize).min(MAX_ADDR_ENTRIES);
    ensure(&buf, count * AddrEntry::SIZE, "addr entries")?;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let timestamp = buf.get_u32_le();
        let addr = NetAddr::decode(&mut buf)?;
        entries.push(AddrEntry { timestamp, addr });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> NodeAddress {
        NodeAddress::parse("203.0.113.9:22556", 22556).unwrap()
    }

    #[test]
    fn test_version_layout() {
        let msg = VersionMessage::new(&peer(), NODE_NETWORK, "/doge-scout:0.1.0/", 100, 42);
        let payload = Message::Version(msg).encode_payload();

        // 4 + 8 + 8 + 26 + 26 + 8 + (1 + 18) + 4 + 1
        assert_eq!(payload.len(), 104);
        assert_eq!(&payload[0..4], &70015i32.to_le_bytes());
        // Receiver IP is IPv4-mapped
        assert_eq!(&payload[28..40], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff]);
        assert_eq!(&payload[40..44], &[203, 0, 113, 9]);
        // Port is big-endian
        assert_eq!(&payload[44..46], &22556u16.to_be_bytes());
        assert_eq!(payload[80], 18);
    }

    #[test]
    fn test_version_decode() {
        let mut msg = VersionMessage::new(&peer(), 5, "TestAgent", 12345, 7);
        msg.relay = true;
        let payload = Message::Version(msg.clone()).encode_payload();

        match Message::decode("version", payload).unwrap() {
            Message::Version(decoded) => {
                assert_eq!(decoded.user_agent, "TestAgent");
                assert_eq!(decoded.start_height, 12345);
                assert_eq!(decoded.services, 5);
                assert_eq!(decoded.receiver.node_address(), peer());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_version_without_relay_flag() {
        let msg = VersionMessage::new(&peer(), 1, "old", 1, 1);
        let payload = Message::Version(msg).encode_payload();
        let trimmed = payload.slice(..payload.len() - 1);

        match Message::decode("version", trimmed).unwrap() {
            Message::Version(decoded) => assert!(decoded.relay),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_version_truncated() {
        let msg = VersionMessage::new(&peer(), 1, "TestAgent", 1, 1);
        let payload = Message::Version(msg).encode_payload();
        assert!(Message::decode("version", payload.slice(..60)).is_err());
        assert!(Message::decode("version", payload.slice(..85)).is_err());
    }

    #[test]
    fn test_addr_decode() {
        let entries: Vec<AddrEntry> = (1..=3u8)
            .map(|i| {
                let addr = NodeAddress::parse(&format!("10.0.0.{}:22556", i), 22556).unwrap();
                AddrEntry::new(&addr, NODE_NETWORK, 1_700_000_000)
            })
            .collect();
        let payload = Message::Addr(entries.clone()).encode_payload();
        assert_eq!(payload.len(), 1 + 3 * AddrEntry::SIZE);

        match Message::decode("addr", payload).unwrap() {
            Message::Addr(decoded) => {
                assert_eq!(decoded, entries);
                assert_eq!(decoded[2].addr.node_address().key(), "10.0.0.3:22556");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_addr_count_capped() {
        let mut buf = BytesMut::new();
        put_compact_size(&mut buf, 5000);
        let entry = AddrEntry::new(&peer(), 1, 0);
        for _ in 0..MAX_ADDR_ENTRIES {
            buf.put_u32_le(entry.timestamp);
            entry.addr.encode(&mut buf);
        }

        match Message::decode("addr", buf.freeze()).unwrap() {
            Message::Addr(decoded) => assert_eq!(decoded.len(), MAX_ADDR_ENTRIES),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_addr_truncated() {
        let mut buf = BytesMut::new();
        put_compact_size(&mut buf, 2);
        buf.put_slice(&[0u8; AddrEntry::SIZE + 4]);
        assert!(Message::decode("addr", buf.freeze()).is_err());
    }

    #[test]
    fn test_unknown_command_passthrough() {
        let msg = Message::decode("sendheaders", Bytes::new()).unwrap();
        assert_eq!(msg.command(), "sendheaders");
    }

    #[test]
    fn test_services_text() {
        assert_eq!(services_text(0), "NONE");
        assert_eq!(services_text(1), "NETWORK");
        assert_eq!(services_text(1 | 4), "NETWORK, BLOOM");
        assert_eq!(services_text(1 | (1 << 10)), "NETWORK, NETWORK_LIMITED");
        assert_eq!(services_text(1 << 20), "0x100000");
    }
}
