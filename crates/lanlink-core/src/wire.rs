//! lanlink wire format: the discovery datagram and its defaults.
//!
//! Announcements are plain UTF-8 text so they can be inspected with tcpdump
//! or produced with `socat`:
//!
//! ```text
//! DISCOVER <host> <port>\n
//! ```
//!
//! `<host>` is a dotted quad or hostname without whitespace, `<port>` a
//! decimal integer in 1..=65535. There is no version field; datagrams with
//! any other leading token are ignored by receivers.

use crate::addr::PeerAddress;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Administratively scoped IPv4 group used for discovery.
pub const MULTICAST_GROUP: &str = "239.255.0.1";

/// UDP port every node binds to receive announcements.
pub const MULTICAST_PORT: u16 = 9999;

/// Multicast TTL. 1 keeps announcements on the local segment.
pub const MULTICAST_TTL: u32 = 1;

/// Seconds between two announcements from the same node.
pub const ANNOUNCE_INTERVAL_SECS: u64 = 5;

/// Seconds after which a silent node is dropped from the discovered table.
pub const PEER_TTL_SECS: u64 = 15;

/// Receive buffer size for announcement datagrams.
pub const MAX_DATAGRAM: usize = 1024;

/// Leading token of an announcement.
pub const DISCOVER_TOKEN: &str = "DISCOVER";

// ── Announcement ──────────────────────────────────────────────────────────────

/// A node advertising where it accepts TCP sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub address: PeerAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnnouncementError {
    #[error("not a discovery datagram")]
    UnknownKind,
    #[error("expected 3 tokens, got {0}")]
    TokenCount(usize),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

impl Announcement {
    pub fn new(address: PeerAddress) -> Self {
        Self { address }
    }

    /// Serialize to the on-wire text, trailing newline included.
    pub fn encode(&self) -> String {
        format!(
            "{} {} {}\n",
            DISCOVER_TOKEN, self.address.host, self.address.port
        )
    }

    /// Parse a received datagram. Invalid UTF-8 is replaced, not rejected.
    pub fn parse(datagram: &[u8]) -> Result<Self, AnnouncementError> {
        let text = String::from_utf8_lossy(datagram);
        let tokens: Vec<&str> = text.split_whitespace().collect();

        if tokens.first() != Some(&DISCOVER_TOKEN) {
            return Err(AnnouncementError::UnknownKind);
        }
        if tokens.len() != 3 {
            return Err(AnnouncementError::TokenCount(tokens.len()));
        }

        let port: u16 = tokens[2]
            .parse()
            .map_err(|_| AnnouncementError::InvalidPort(tokens[2].to_string()))?;
        if port == 0 {
            return Err(AnnouncementError::InvalidPort(tokens[2].to_string()));
        }

        Ok(Self::new(PeerAddress::new(tokens[1], port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_grammar() {
        let ann = Announcement::new(PeerAddress::new("10.0.0.2", 9000));
        assert_eq!(ann.encode(), "DISCOVER 10.0.0.2 9000\n");
    }

    #[test]
    fn parse_accepts_encoded() {
        let ann = Announcement::parse(b"DISCOVER 10.0.0.5 9000\n").unwrap();
        assert_eq!(ann.address, PeerAddress::new("10.0.0.5", 9000));
    }

    #[test]
    fn parse_tolerates_extra_whitespace() {
        let ann = Announcement::parse(b"  DISCOVER\t node-b   8001 \r\n").unwrap();
        assert_eq!(ann.address, PeerAddress::new("node-b", 8001));
    }

    #[test]
    fn parse_ignores_unknown_kind() {
        assert_eq!(
            Announcement::parse(b"HELLO 10.0.0.5 9000"),
            Err(AnnouncementError::UnknownKind)
        );
        assert_eq!(Announcement::parse(b""), Err(AnnouncementError::UnknownKind));
    }

    #[test]
    fn parse_rejects_wrong_token_count() {
        assert_eq!(
            Announcement::parse(b"DISCOVER 10.0.0.5"),
            Err(AnnouncementError::TokenCount(2))
        );
        assert_eq!(
            Announcement::parse(b"DISCOVER 10.0.0.5 9000 extra"),
            Err(AnnouncementError::TokenCount(4))
        );
    }

    #[test]
    fn parse_rejects_bad_port() {
        assert!(matches!(
            Announcement::parse(b"DISCOVER 10.0.0.5 ninety"),
            Err(AnnouncementError::InvalidPort(_))
        ));
        assert!(matches!(
            Announcement::parse(b"DISCOVER 10.0.0.5 70000"),
            Err(AnnouncementError::InvalidPort(_))
        ));
        assert!(matches!(
            Announcement::parse(b"DISCOVER 10.0.0.5 0"),
            Err(AnnouncementError::InvalidPort(_))
        ));
    }

    #[test]
    fn parse_replaces_invalid_utf8_in_host() {
        let ann = Announcement::parse(b"DISCOVER ho\xffst 8000").unwrap();
        assert_eq!(ann.address.port, 8000);
        assert!(ann.address.host.contains('\u{FFFD}'));
    }
}
