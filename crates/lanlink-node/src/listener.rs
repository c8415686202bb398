//! Inbound TCP listener.
//!
//! Accepts until shutdown; each socket becomes an Inbound registry entry
//! with its own session task.

use tokio::net::TcpListener;

use lanlink_core::PeerAddress;

use crate::lifecycle::Shutdown;
use crate::peer::Peer;
use crate::registry::Direction;

pub(crate) async fn accept_loop(listener: TcpListener, peer: Peer, mut shutdown: Shutdown) {
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("tcp listener shutting down");
                return;
            }

            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };

                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(error = %e, "TCP_NODELAY not set");
                }

                let address = PeerAddress::from(remote);
                let (reader, writer) = stream.into_split();
                let registered = peer.registry().add(writer, address.clone(), Direction::Inbound);
                tracing::info!(id = %registered.id, peer = %address, "inbound connection registered");

                peer.spawn_session(registered, reader, address, Direction::Inbound);
            }
        }
    }
}
