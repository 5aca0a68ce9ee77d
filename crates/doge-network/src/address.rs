//! Peer addresses.
//!
//! A peer is identified by a host and a port. The host may be an IPv4 or IPv6
//! literal, a Tor onion name, or a DNS name. [`NodeAddress::key`] produces the
//! canonical string used to deduplicate peers, so that every spelling of the same
//! endpoint maps to one key:
//!
//! ```text
//! 1.2.3.4:22556            -> 1.2.3.4:22556
//! [::ffff:1.2.3.4]:22556   -> 1.2.3.4:22556
//! ::ffff:1.2.3.4           -> 1.2.3.4:<default port>
//! [2001:DB8::1]:22556      -> [2001:db8::1]:22556
//! Seed.Example.ORG.:22556  -> seed.example.org:22556
//! ```

use crate::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Suffix marking a Tor hidden service name.
pub const ONION_SUFFIX: &str = ".onion";

/// The host part of a peer address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Onion(String),
    Domain(String),
}

impl Host {
    /// Parse a host, accepting bracketed IPv6 literals.
    pub fn parse(raw: &str) -> NetworkResult<Self> {
        let trimmed = raw.trim();
        let unbracketed = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);

        if unbracketed.is_empty() {
            return Err(NetworkError::InvalidAddress("empty host".to_string()));
        }

        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip));
        }

        let name = unbracketed.trim_end_matches('.').to_ascii_lowercase();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
        if !valid {
            return Err(NetworkError::InvalidAddress(format!("bad host '{}'", raw)));
        }

        if name.ends_with(ONION_SUFFIX) {
            Ok(Host::Onion(name))
        } else {
            Ok(Host::Domain(name))
        }
    }

    /// Build a host from an IP, collapsing IPv4-mapped IPv6 to plain IPv4.
    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Host::Ipv4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => Host::Ipv4(v4),
                None => Host::Ipv6(v6),
            },
        }
    }

    /// The IP literal, if this host is one.
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Host::Ipv4(v4) => Some(IpAddr::V4(*v4)),
            Host::Ipv6(v6) => Some(IpAddr::V6(*v6)),
            Host::Onion(_) | Host::Domain(_) => None,
        }
    }

    pub fn is_onion(&self) -> bool {
        matches!(self, Host::Onion(_))
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Ipv4(v4) => write!(f, "{}", v4),
            Host::Ipv6(v6) => write!(f, "{}", v6),
            Host::Onion(name) | Host::Domain(name) => f.write_str(name),
        }
    }
}

impl TryFrom<String> for Host {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Host::parse(&value)
    }
}

impl From<Host> for String {
    fn from(host: Host) -> Self {
        host.to_string()
    }
}

/// A (host, port) pair identifying a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Host part.
    #[serde(rename = "address")]
    pub host: Host,
    /// TCP port.
    pub port: u16,
}

impl NodeAddress {
    /// Create a new address.
    pub fn new(host: Host, port: u16) -> Self {
        Self { host, port }
    }

    /// Create from a resolved socket address.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::new(Host::from_ip(addr.ip()), addr.port())
    }

    /// Create from the 16-byte wire form used in version and addr payloads.
    pub fn from_wire(ip: [u8; 16], port: u16) -> Self {
        Self::new(Host::from_ip(IpAddr::V6(Ipv6Addr::from(ip))), port)
    }

    /// Parse `host`, `host:port`, `[v6]:port` or a bare IPv6 literal.
    ///
    /// `default_port` is used when the string carries no port.
    pub fn parse(input: &str, default_port: u16) -> NetworkResult<Self> {
        let input = input.trim();
        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let close = rest.find(']').ok_or_else(|| {
                NetworkError::InvalidAddress(format!("unterminated '[' in '{}'", input))
            })?;
            let host = &rest[..close];
            let tail = &rest[close + 1..];
            let port = match tail.strip_prefix(':') {
                Some(port) => Some(port),
                None if tail.is_empty() => None,
                None => {
                    return Err(NetworkError::InvalidAddress(format!(
                        "unexpected '{}' after ']'",
                        tail
                    )))
                }
            };
            (host, port)
        } else {
            match input.matches(':').count() {
                0 => (input, None),
                1 => {
                    let (host, port) = input.split_at(input.rfind(':').unwrap_or(0));
                    (host, Some(&port[1..]))
                }
                // More than one colon without brackets is a bare IPv6 literal.
                _ => (input, None),
            }
        };

        let port = match port {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| NetworkError::InvalidAddress(format!("bad port '{}'", raw)))?,
            None => default_port,
        };
        if port == 0 {
            return Err(NetworkError::InvalidAddress(format!(
                "missing port in '{}'",
                input
            )));
        }

        Ok(Self::new(Host::parse(host)?, port))
    }

    /// Canonical deduplication key.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// The socket address, if the host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.host.ip().map(|ip| SocketAddr::new(ip, self.port))
    }

    /// 16-byte wire form of the host. Names encode as the unspecified address.
    pub fn wire_ip(&self) -> [u8; 16] {
        match &self.host {
            Host::Ipv4(v4) => v4.to_ipv6_mapped().octets(),
            Host::Ipv6(v6) => v6.octets(),
            Host::Onion(_) | Host::Domain(_) => Ipv6Addr::UNSPECIFIED.octets(),
        }
    }

    /// Whether the address is worth dialing at all.
    pub fn is_routable(&self) -> bool {
        if self.port == 0 {
            return false;
        }
        match self.host.ip() {
            Some(ip) => !ip.is_unspecified() && !ip.is_multicast(),
            None => true,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv6(v6) => write!(f, "[{}]:{}", v6, self.port),
            host => write!(f, "{}:{}", host, self.port),
        }
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}
