//! Wire handshake client.
//!
//! One call to [`HandshakeClient::perform`] dials a peer, runs the
//! version/verack exchange and optionally asks for the peer's address book:
//!
//! ```text
//!   us                          peer
//!   | --------- version ---------> |
//!   | <-------- version ---------- |   (wait up to version_timeout)
//!   | --------- verack ----------> |
//!   | --------- getaddr ---------> |
//!   | <--------- addr ------------ |   (wait up to addr_timeout, optional)
//! ```
//!
//! The exchange is relaxed: we never insist on the peer's verack, and a peer that
//! ignores getaddr still counts as a successful handshake.

use crate::{
    Host, Message, MessageCodec, NetworkError, NetworkParams, NetworkResult, NodeAddress,
    VersionMessage, MAINNET_MAGIC, MAX_MESSAGE_SIZE, USER_AGENT,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, instrument, trace};

type WireStream = Framed<TcpStream, MessageCodec>;

/// Handshake configuration.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Network magic bytes.
    pub magic: [u8; 4],
    /// TCP connect timeout (also bounds name resolution).
    pub connect_timeout: Duration,
    /// How long to wait for the peer's version.
    pub version_timeout: Duration,
    /// Poll increment while waiting for version.
    pub version_poll: Duration,
    /// Send getaddr after the handshake.
    pub request_addresses: bool,
    /// How long to wait for an addr reply.
    pub addr_timeout: Duration,
    /// Poll increment while waiting for addr.
    pub addr_poll: Duration,
    /// User agent we announce.
    pub user_agent: String,
    /// Services we announce.
    pub services: u64,
    /// Best height we announce.
    pub start_height: i32,
    /// Maximum accepted payload size.
    pub max_message_size: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            magic: MAINNET_MAGIC,
            connect_timeout: Duration::from_secs(5),
            version_timeout: Duration::from_secs(5),
            version_poll: Duration::from_millis(100),
            request_addresses: true,
            addr_timeout: Duration::from_secs(3),
            addr_poll: Duration::from_millis(50),
            user_agent: USER_AGENT.to_string(),
            services: 0,
            start_height: 0,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl HandshakeConfig {
    /// Defaults for the given network.
    pub fn for_network(params: &NetworkParams) -> Self {
        Self {
            magic: params.magic,
            ..Default::default()
        }
    }

    /// Longest a complete handshake can take under these timeouts.
    pub fn worst_case(&self) -> Duration {
        let addr = if self.request_addresses {
            self.addr_timeout
        } else {
            Duration::ZERO
        };
        self.connect_timeout + self.version_timeout + addr
    }
}

/// What the peer told us about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerVersion {
    /// Protocol version.
    pub version: i32,
    /// User agent (sub-version).
    pub user_agent: String,
    /// Service bitmask.
    pub services: u64,
    /// Best chain height the peer claims.
    pub start_height: i32,
    /// Whether the peer wants transaction relay.
    pub relay: bool,
    /// Time from sending our version to receiving theirs.
    pub latency_ms: i64,
}

/// Result of a successful handshake.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    /// Address that was dialed.
    pub peer: NodeAddress,
    /// Negotiated peer information.
    pub info: PeerVersion,
    /// Routable addresses learned from the peer's addr reply.
    pub addresses: Vec<NodeAddress>,
}

/// Performs version/verack/getaddr exchanges with individual peers.
#[derive(Debug, Clone)]
pub struct HandshakeClient {
    config: HandshakeConfig,
}

impl HandshakeClient {
    /// Create a new handshake client.
    pub fn new(config: HandshakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Dial `addr` and run one handshake.
    ///
    /// Every failure (unreachable host, timeout, malformed reply) comes back as an
    /// `Err` carrying the reason; nothing here panics on peer input.
    #[instrument(skip(self), fields(peer = %addr))]
    pub async fn perform(&self, addr: &NodeAddress) -> NetworkResult<HandshakeOutcome> {
        let stream = self.connect(addr).await?;
        let codec = MessageCodec::with_magic(self.config.magic)
            .with_max_size(self.config.max_message_size);
        let mut framed = Framed::new(stream, codec);

        let nonce: u64 = rand::random();
        let version = VersionMessage::new(
            addr,
            self.config.services,
            self.config.user_agent.clone(),
            self.config.start_height,
            nonce,
        );
        let sent_at = Instant::now();
        framed.send(Message::Version(version)).await?;

        let remote = wait_for(
            &mut framed,
            self.config.version_timeout,
            self.config.version_poll,
            |msg| match msg {
                Message::Version(v) => Some(v),
                _ => None,
            },
        )
        .await?
        .ok_or_else(|| {
            NetworkError::Timeout(format!(
                "no version within {:?}",
                self.config.version_timeout
            ))
        })?;
        let latency_ms = sent_at.elapsed().as_millis() as i64;

        if remote.nonce == nonce {
            return Err(NetworkError::HandshakeFailed(
                "connected to ourselves".to_string(),
            ));
        }

        debug!(
            version = remote.version,
            agent = %remote.user_agent,
            height = remote.start_height,
            latency_ms,
            "Received version"
        );

        framed.send(Message::Verack).await?;

        let info = PeerVersion {
            version: remote.version,
            user_agent: remote.user_agent,
            services: remote.services,
            start_height: remote.start_height,
            relay: remote.relay,
            latency_ms,
        };

        let addresses = if self.config.request_addresses {
            match self.request_addresses(&mut framed, addr).await {
                Ok(addresses) => addresses,
                Err(e) => {
                    debug!(error = %e, "Address exchange abandoned");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(HandshakeOutcome {
            peer: addr.clone(),
            info,
            addresses,
        })
    }

    /// Resolve and dial, bounded by the connect timeout.
    async fn connect(&self, addr: &NodeAddress) -> NetworkResult<TcpStream> {
        let limit = self.config.connect_timeout;
        let target = match &addr.host {
            Host::Onion(name) => {
                return Err(NetworkError::Unreachable(format!(
                    "{} requires a Tor proxy",
                    name
                )))
            }
            Host::Domain(name) => {
                let mut resolved = timeout(limit, tokio::net::lookup_host((name.as_str(), addr.port)))
                    .await
                    .map_err(|_| NetworkError::Timeout(format!("resolving {}", name)))?
                    .map_err(|e| NetworkError::Resolution {
                        host: name.clone(),
                        reason: e.to_string(),
                    })?;
                resolved.next().ok_or_else(|| NetworkError::Resolution {
                    host: name.clone(),
                    reason: "no addresses".to_string(),
                })?
            }
            Host::Ipv4(_) | Host::Ipv6(_) => addr
                .socket_addr()
                .ok_or_else(|| NetworkError::InvalidAddress(addr.to_string()))?,
        };

        let stream = timeout(limit, TcpStream::connect(target))
            .await
            .map_err(|_| NetworkError::Timeout(format!("connect after {:?}", limit)))?
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);

        debug!(target = %target, "Connected");
        Ok(stream)
    }

    /// Send getaddr and collect the reply.
    ///
    /// Peers often announce themselves with a one-entry addr before answering,
    /// so single entries are collected and the wait continues until a real list
    /// arrives or the timeout passes.
    async fn request_addresses(
        &self,
        framed: &mut WireStream,
        peer: &NodeAddress,
    ) -> NetworkResult<Vec<NodeAddress>> {
        framed.send(Message::GetAddr).await?;

        let mut collected = Vec::new();
        let answered = wait_for(
            framed,
            self.config.addr_timeout,
            self.config.addr_poll,
            |msg| match msg {
                Message::Addr(entries) => {
                    let full = entries.len() > 1;
                    collected.extend(entries);
                    full.then_some(())
                }
                _ => None,
            },
        )
        .await?;

        if answered.is_none() && collected.is_empty() {
            debug!("No addr reply");
        }

        let mut seen = HashSet::new();
        let addresses: Vec<NodeAddress> = collected
            .into_iter()
            .map(|entry| entry.addr.node_address())
            .filter(|a| a.is_routable() && a != peer)
            .filter(|a| seen.insert(a.key()))
            .collect();

        debug!(count = addresses.len(), "Received addresses");
        Ok(addresses)
    }
}

/// Read messages until `pick` accepts one or `limit` elapses.
///
/// Reads are sliced into `poll` increments so the deadline is checked regularly.
/// Pings are answered in passing. Returns `Ok(None)` on timeout.
async fn wait_for<T>(
    framed: &mut WireStream,
    limit: Duration,
    poll: Duration,
    mut pick: impl FnMut(Message) -> Option<T>,
) -> NetworkResult<Option<T>> {
    let deadline = Instant::now() + limit;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        let slice = poll.min(deadline - now);

        match timeout(slice, framed.next()).await {
            Err(_) => continue,
            Ok(None) => return Err(NetworkError::ConnectionClosed),
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(Message::Ping(nonce)))) => {
                framed.send(Message::Pong(nonce)).await?;
            }
            Ok(Some(Ok(msg))) => {
                let command = msg.command().to_string();
                match pick(msg) {
                    Some(value) => return Ok(Some(value)),
                    None => trace!(command = %command, "Skipping message"),
                }
            }
        }
    }
}
