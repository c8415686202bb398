//! Peer addressing and the dial tie-break.
//!
//! A `PeerAddress` is the identity of a node on the LAN: the host it binds
//! and the TCP port it listens on. It doubles as the equality key for
//! "already connected" checks and as the ordering key that decides which
//! side of a pair opens the TCP connection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// `(host, port)` of a node.
///
/// Field order matters: the derived `Ord` compares `host` as a string first
/// and `port` as an integer second.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<std::net::SocketAddr> for PeerAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("missing ':' in peer address {0:?}")]
    MissingPort(String),
    #[error("empty host in peer address {0:?}")]
    EmptyHost(String),
    #[error("invalid port in peer address {0:?}")]
    InvalidPort(String),
}

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    /// Parse `host:port`. The port is split off the last ':'.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(AddressParseError::EmptyHost(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(s.to_string()))?;
        if port == 0 {
            return Err(AddressParseError::InvalidPort(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

/// Returns true when `local` is the side that must dial `remote`.
///
/// Both nodes evaluate this with the arguments swapped, so for two distinct
/// addresses exactly one of them gets `true`.
pub fn should_initiate(local: &PeerAddress, remote: &PeerAddress) -> bool {
    local < remote
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_host_initiates() {
        let a = PeerAddress::new("10.0.0.2", 9000);
        let b = PeerAddress::new("10.0.0.5", 9000);
        assert!(should_initiate(&a, &b));
        assert!(!should_initiate(&b, &a));
    }

    #[test]
    fn port_breaks_tie_on_same_host() {
        let a = PeerAddress::new("127.0.0.1", 8000);
        let b = PeerAddress::new("127.0.0.1", 8001);
        assert!(should_initiate(&a, &b));
        assert!(!should_initiate(&b, &a));
    }

    #[test]
    fn host_is_compared_as_string() {
        // "10.0.0.10" < "10.0.0.9" lexicographically, regardless of port
        let a = PeerAddress::new("10.0.0.10", 9999);
        let b = PeerAddress::new("10.0.0.9", 1);
        assert!(should_initiate(&a, &b));
    }

    #[test]
    fn exactly_one_side_initiates() {
        let addrs = [
            PeerAddress::new("192.168.1.1", 8000),
            PeerAddress::new("192.168.1.1", 8001),
            PeerAddress::new("192.168.1.10", 7000),
            PeerAddress::new("192.168.1.2", 9000),
            PeerAddress::new("host-a", 8000),
        ];
        for a in &addrs {
            for b in &addrs {
                if a == b {
                    assert!(!should_initiate(a, b));
                    continue;
                }
                assert_ne!(should_initiate(a, b), should_initiate(b, a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn parse_host_port() {
        let addr: PeerAddress = "192.168.58.143:8000".parse().unwrap();
        assert_eq!(addr, PeerAddress::new("192.168.58.143", 8000));
        assert_eq!(addr.to_string(), "192.168.58.143:8000");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            "localhost".parse::<PeerAddress>(),
            Err(AddressParseError::MissingPort(_))
        ));
        assert!(matches!(
            ":8000".parse::<PeerAddress>(),
            Err(AddressParseError::EmptyHost(_))
        ));
        assert!(matches!(
            "host:http".parse::<PeerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "host:0".parse::<PeerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
    }
}
