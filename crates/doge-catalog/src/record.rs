//! Peer records.

use doge_network::{services_text, NodeAddress, PeerVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Where a peer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerStatus {
    /// Known address, never successfully handshaken (or not since it went offline).
    Discovered,
    /// Completed a handshake recently.
    Online,
    /// Silent for longer than the offline threshold.
    Offline,
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerStatus::Discovered => "Discovered",
            PeerStatus::Online => "Online",
            PeerStatus::Offline => "Offline",
        };
        f.write_str(name)
    }
}

/// How a peer first reached the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PeerSource {
    /// A DNS seed answer.
    Dns,
    /// The built-in fallback list.
    Fallback,
    /// An addr reply received during a regular handshake.
    PeerExchange,
    /// Snowball amplification in the given round (1-based).
    Snowball(u32),
    /// A user-triggered connection.
    Manual,
    /// Tag written by something else.
    Other(String),
}

impl fmt::Display for PeerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerSource::Dns => f.write_str("DNS"),
            PeerSource::Fallback => f.write_str("Fallback"),
            PeerSource::PeerExchange => f.write_str("Peer Exchange"),
            PeerSource::Snowball(round) => write!(f, "Snowball Round {}", round),
            PeerSource::Manual => f.write_str("Manual"),
            PeerSource::Other(tag) => f.write_str(tag),
        }
    }
}

impl From<String> for PeerSource {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "DNS" => PeerSource::Dns,
            "Fallback" => PeerSource::Fallback,
            "Peer Exchange" => PeerSource::PeerExchange,
            "Manual" => PeerSource::Manual,
            _ => match tag
                .strip_prefix("Snowball Round ")
                .and_then(|n| n.parse::<u32>().ok())
            {
                Some(round) => PeerSource::Snowball(round),
                None => PeerSource::Other(tag),
            },
        }
    }
}

impl From<PeerSource> for String {
    fn from(source: PeerSource) -> Self {
        source.to_string()
    }
}

/// Everything the catalog knows about one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    #[serde(flatten)]
    pub address: NodeAddress,
    /// Protocol version, 0 while unknown.
    pub version: i32,
    /// User agent reported in the version message.
    #[serde(rename = "sub_version")]
    pub user_agent: String,
    pub services: u64,
    /// Best chain height the peer reported.
    #[serde(rename = "synced_blocks")]
    pub height: i32,
    /// Round trip of the last handshake in ms, -1 while unknown.
    #[serde(rename = "latency")]
    pub latency_ms: i64,
    pub status: PeerStatus,
    pub source: PeerSource,
    /// Unix millis.
    pub first_discovered: u64,
    /// Unix millis.
    pub last_seen: u64,
    /// Unix millis of the last handshake attempt, if any.
    #[serde(default)]
    pub last_handshake_attempt: Option<u64>,
    /// Set by a user-triggered refresh; shields the record from background updates.
    #[serde(default)]
    pub manually_updated: bool,
}

impl PeerRecord {
    /// A freshly sighted peer.
    pub fn discovered(address: NodeAddress, source: PeerSource, now: u64) -> Self {
        Self {
            address,
            version: 0,
            user_agent: String::new(),
            services: 0,
            height: 0,
            latency_ms: -1,
            status: PeerStatus::Discovered,
            source,
            first_discovered: now,
            last_seen: now,
            last_handshake_attempt: None,
            manually_updated: false,
        }
    }

    /// A peer that just completed a handshake.
    pub fn online(address: NodeAddress, info: &PeerVersion, source: PeerSource, now: u64) -> Self {
        let mut record = Self::discovered(address, source, now);
        record.apply_handshake(info, now);
        record
    }

    /// Catalog key.
    pub fn key(&self) -> String {
        self.address.key()
    }

    /// Fold in a successful handshake.
    pub fn apply_handshake(&mut self, info: &PeerVersion, now: u64) {
        self.version = info.version;
        self.user_agent = info.user_agent.clone();
        self.services = info.services;
        self.height = info.start_height;
        self.latency_ms = info.latency_ms;
        self.status = PeerStatus::Online;
        self.last_seen = now;
        self.last_handshake_attempt = Some(now);
    }

    pub fn is_online(&self) -> bool {
        self.status == PeerStatus::Online
    }

    /// Whether a background handshake should be tried now.
    ///
    /// Online peers are skipped, as are peers attempted within `retry_after`.
    pub fn should_attempt_handshake(&self, now: u64, retry_after: Duration) -> bool {
        if self.is_online() {
            return false;
        }
        match self.last_handshake_attempt {
            None => true,
            Some(at) => now.saturating_sub(at) > retry_after.as_millis() as u64,
        }
    }

    /// Milliseconds since the peer was last seen.
    pub fn silence(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_seen)
    }

    pub fn services_text(&self) -> String {
        services_text(self.services)
    }

    /// Short human form of `last_seen`, e.g. "5m ago".
    pub fn last_seen_text(&self, now: u64) -> String {
        let secs = self.silence(now) / 1000;
        match secs {
            0..=59 => "Just now".to_string(),
            60..=3599 => format!("{}m ago", secs / 60),
            3600..=86_399 => format!("{}h ago", secs / 3600),
            _ => format!("{}d ago", secs / 86_400),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> NodeAddress {
        NodeAddress::parse("198.51.100.4:22556", 22556).unwrap()
    }

    fn info() -> PeerVersion {
        PeerVersion {
            version: 70015,
            user_agent: "/Shibetoshi:1.14.6/".to_string(),
            services: 5,
            start_height: 5_000_000,
            relay: true,
            latency_ms: 120,
        }
    }

    #[test]
    fn test_source_tags() {
        assert_eq!(PeerSource::Snowball(2).to_string(), "Snowball Round 2");
        assert_eq!(
            PeerSource::from("Snowball Round 3".to_string()),
            PeerSource::Snowball(3)
        );
        assert_eq!(PeerSource::from("DNS".to_string()), PeerSource::Dns);
        assert_eq!(
            PeerSource::from("Imported".to_string()),
            PeerSource::Other("Imported".to_string())
        );
    }

    #[test]
    fn test_online_record() {
        let record = PeerRecord::online(addr(), &info(), PeerSource::Dns, 1_000);
        assert_eq!(record.status, PeerStatus::Online);
        assert_eq!(record.height, 5_000_000);
        assert_eq!(record.latency_ms, 120);
        assert_eq!(record.services_text(), "NETWORK, BLOOM");
    }

    #[test]
    fn test_should_attempt_handshake() {
        let retry = Duration::from_secs(30);
        let mut record = PeerRecord::discovered(addr(), PeerSource::Dns, 0);
        assert!(record.should_attempt_handshake(0, retry));

        record.last_handshake_attempt = Some(10_000);
        assert!(!record.should_attempt_handshake(20_000, retry));
        assert!(record.should_attempt_handshake(41_000, retry));

        record.apply_handshake(&info(), 41_000);
        assert!(!record.should_attempt_handshake(1_000_000, retry));
    }

    #[test]
    fn test_last_seen_text() {
        let record = PeerRecord::discovered(addr(), PeerSource::Dns, 0);
        assert_eq!(record.last_seen_text(30_000), "Just now");
        assert_eq!(record.last_seen_text(5 * 60_000), "5m ago");
        assert_eq!(record.last_seen_text(3 * 3_600_000), "3h ago");
        assert_eq!(record.last_seen_text(2 * 86_400_000), "2d ago");
    }

    #[test]
    fn test_json_field_names() {
        let record = PeerRecord::online(addr(), &info(), PeerSource::Snowball(1), 1_000);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["address"], "198.51.100.4");
        assert_eq!(json["port"], 22556);
        assert_eq!(json["sub_version"], "/Shibetoshi:1.14.6/");
        assert_eq!(json["synced_blocks"], 5_000_000);
        assert_eq!(json["status"], "Online");
        assert_eq!(json["source"], "Snowball Round 1");

        let back: PeerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
