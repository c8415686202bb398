//! Multicast discovery: announcer, listener, and the discovered-peer table.
//!
//! The table is diagnostics only: it records who has been heard on the
//! group and when. Whether to dial is decided per announcement by the
//! ordering rule, and connection state lives in the registry.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use lanlink_core::config::DiscoveryConfig;
use lanlink_core::PeerAddress;

use crate::error::{Error, Result};

pub mod announcer;
pub mod listener;

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub group: Ipv4Addr,
    pub port: u16,
    pub ttl: u32,
    pub announce_interval: Duration,
    pub peer_ttl: Duration,
}

impl DiscoveryOptions {
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        let group: Ipv4Addr = config
            .group
            .parse()
            .map_err(|_| Error::InvalidAddress(config.group.clone()))?;
        Ok(Self {
            group,
            port: config.port,
            ttl: config.ttl,
            announce_interval: config.announce_interval(),
            peer_ttl: config.peer_ttl(),
        })
    }
}

/// Interface to pin multicast traffic to: the bind host when it is an IPv4
/// literal, otherwise let the kernel choose.
pub fn interface_for(host: &str) -> Ipv4Addr {
    host.parse().unwrap_or(Ipv4Addr::UNSPECIFIED)
}

// ── Discovered-peer table ─────────────────────────────────────────────────────

/// A node heard on the multicast group.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    /// The address the node announced.
    pub address: PeerAddress,
    /// Source of the most recent datagram.
    pub source: SocketAddr,
    pub last_seen: Instant,
}

/// Concurrent table of discovered nodes, keyed by announced address.
#[derive(Clone, Default)]
pub struct DiscoveredPeers {
    peers: Arc<DashMap<PeerAddress, DiscoveredPeer>>,
}

impl DiscoveredPeers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer.
    pub fn record(&self, address: PeerAddress, source: SocketAddr) {
        let now = Instant::now();
        self.peers
            .entry(address.clone())
            .and_modify(|p| {
                p.source = source;
                p.last_seen = now;
            })
            .or_insert(DiscoveredPeer {
                address,
                source,
                last_seen: now,
            });
    }

    /// Drop entries not refreshed within `ttl`. Returns how many were dropped.
    pub fn expire(&self, ttl: Duration) -> usize {
        let before = self.peers.len();
        self.peers.retain(|_, p| p.last_seen.elapsed() < ttl);
        let removed = before.saturating_sub(self.peers.len());
        if removed > 0 {
            tracing::debug!(removed, "expired discovered peers");
        }
        removed
    }

    /// All entries, ordered by address.
    pub fn list(&self) -> Vec<DiscoveredPeer> {
        let mut peers: Vec<_> = self.peers.iter().map(|e| e.value().clone()).collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
