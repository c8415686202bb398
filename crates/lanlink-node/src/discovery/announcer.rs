//! Discovery announcement broadcast.
//!
//! Periodically sends `DISCOVER <host> <port>` to the multicast group so
//! nodes on the same segment can find this one.

use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use lanlink_core::wire::Announcement;

use super::DiscoveryOptions;
use crate::error::{Error, Result};
use crate::lifecycle::{self, Shutdown};

/// Broadcast `announcement` every `options.announce_interval` until shutdown.
pub(crate) async fn announce_loop(
    socket: UdpSocket,
    announcement: Announcement,
    options: DiscoveryOptions,
    mut shutdown: Shutdown,
) {
    let dest = SocketAddrV4::new(options.group, options.port);
    let payload = announcement.encode();
    let mut interval = lifecycle::ticker(options.announce_interval);

    tracing::info!(
        group = %options.group,
        port = options.port,
        interval_ms = interval.period().as_millis() as u64,
        self_addr = %announcement.address,
        "discovery announcer starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("discovery announcer shutting down");
                return;
            }

            _ = interval.tick() => {
                match socket.send_to(payload.as_bytes(), dest).await {
                    Ok(n) => tracing::trace!(bytes = n, "announcement sent"),
                    Err(e) => tracing::warn!(error = %e, "announcement send failed"),
                }
            }
        }
    }
}

/// Create a UDP socket for sending IPv4 multicast, pinned to `interface`.
pub(crate) fn make_announce_socket(interface: Ipv4Addr, ttl: u32) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(Error::multicast("socket()"))?;

    if !interface.is_unspecified() {
        socket
            .set_multicast_if_v4(&interface)
            .map_err(Error::multicast("IP_MULTICAST_IF"))?;
    }
    socket
        .set_multicast_ttl_v4(ttl)
        .map_err(Error::multicast("IP_MULTICAST_TTL"))?;
    // nodes sharing a host must hear each other
    socket
        .set_multicast_loop_v4(true)
        .map_err(Error::multicast("IP_MULTICAST_LOOP"))?;
    socket
        .set_nonblocking(true)
        .map_err(Error::multicast("set_nonblocking"))?;
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())
        .map_err(Error::multicast("bind()"))?;

    Ok(socket.into())
}
