//! Discovery announcement listener.
//!
//! Joins the multicast group and, for every valid announcement from another
//! node, records it and applies the ordering rule: the lower address dials,
//! the higher one waits for the inbound connection.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use lanlink_core::wire::{Announcement, MAX_DATAGRAM};
use lanlink_core::{should_initiate, PeerAddress};

use super::DiscoveryOptions;
use crate::error::{Error, Result};
use crate::lifecycle::Shutdown;
use crate::peer::Peer;
use crate::registry::ConnectionId;

/// What the listener did with one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Not a well-formed announcement.
    Malformed,
    /// Our own announcement looped back.
    OwnAnnouncement,
    /// A connection to the announced address already exists.
    Connected(ConnectionId),
    /// We are the initiator: dial.
    Dial(PeerAddress),
    /// The other side is the initiator: wait for it.
    Wait(PeerAddress),
}

/// Delay between retries after `recv_from` errors. Doubles per consecutive
/// failure up to a cap and resets on the next good datagram.
#[derive(Debug)]
pub(crate) struct RecvBackoff {
    failures: u32,
}

impl RecvBackoff {
    const BASE: Duration = Duration::from_millis(50);
    const MAX: Duration = Duration::from_secs(5);

    pub(crate) fn new() -> Self {
        Self { failures: 0 }
    }

    /// Record a failure and return how long to wait before the next receive.
    pub(crate) fn fail(&mut self) -> Duration {
        let delay = Self::BASE
            .saturating_mul(1u32 << self.failures.min(16))
            .min(Self::MAX);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

pub(crate) async fn listener_loop(
    socket: UdpSocket,
    peer: Peer,
    options: DiscoveryOptions,
    mut shutdown: Shutdown,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut expiry = tokio::time::interval(Duration::from_secs(1));
    let mut backoff = RecvBackoff::new();

    tracing::info!(group = %options.group, port = options.port, "discovery listener starting");

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("discovery listener shutting down");
                return;
            }

            _ = expiry.tick() => {
                peer.discovered().expire(options.peer_ttl);
            }

            received = socket.recv_from(&mut buf) => {
                let (len, source) = match received {
                    Ok(r) => {
                        backoff.reset();
                        r
                    }
                    Err(e) => {
                        let delay = backoff.fail();
                        tracing::warn!(
                            error = %e,
                            failures = backoff.failures(),
                            retry_in_ms = delay.as_millis() as u64,
                            "recv_from failed"
                        );
                        tokio::select! {
                            _ = shutdown.wait() => {
                                tracing::info!("discovery listener shutting down");
                                return;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                };

                if let Decision::Dial(remote) = handle_datagram(&peer, &buf[..len], source) {
                    peer.spawn_dial(remote);
                }
            }
        }
    }
}

/// Parse one datagram, record the sender, and decide whether to dial.
pub fn handle_datagram(peer: &Peer, datagram: &[u8], source: SocketAddr) -> Decision {
    let remote = match Announcement::parse(datagram) {
        Ok(ann) => ann.address,
        Err(e) => {
            tracing::trace!(%source, error = %e, "ignoring datagram");
            return Decision::Malformed;
        }
    };

    let local = peer.local_address();
    if remote == local {
        tracing::trace!("ignoring own announcement");
        return Decision::OwnAnnouncement;
    }

    peer.discovered().record(remote.clone(), source);

    if let Some(id) = peer.registry().find_by_address(&remote) {
        return Decision::Connected(id);
    }

    if should_initiate(&local, &remote) {
        tracing::debug!(peer = %remote, "peer discovered, we initiate");
        Decision::Dial(remote)
    } else {
        tracing::debug!(peer = %remote, "peer discovered, waiting for inbound connection");
        Decision::Wait(remote)
    }
}

/// Create a UDP socket bound to the discovery port and joined to the group.
pub(crate) fn make_listener_socket(
    group: Ipv4Addr,
    port: u16,
    interface: Ipv4Addr,
) -> Result<std::net::UdpSocket> {
    if !group.is_multicast() {
        return Err(Error::InvalidAddress(group.to_string()));
    }

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(Error::multicast("socket()"))?;

    socket
        .set_reuse_address(true)
        .map_err(Error::multicast("SO_REUSEADDR"))?;
    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(Error::multicast("SO_REUSEPORT"))?;
    socket
        .set_nonblocking(true)
        .map_err(Error::multicast("set_nonblocking"))?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket
        .bind(&bind_addr.into())
        .map_err(Error::multicast("bind()"))?;

    socket
        .join_multicast_v4(&group, &interface)
        .map_err(Error::multicast("IP_ADD_MEMBERSHIP"))?;

    Ok(socket.into())
}
