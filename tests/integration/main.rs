//! lanlink integration test harness.
//!
//! Every test runs real peers in-process over loopback TCP with discovery
//! off. Initiators bind 127.0.0.1 and acceptors 127.0.0.2, so the ordering
//! rule always lets the first dial the second regardless of which ports
//! the OS hands out.
//!
//! Multicast tests need a multicast-capable interface and only run with
//!
//!   LANLINK_MULTICAST_TESTS=1 cargo test --test integration

use std::time::Duration;

use lanlink_node::{Peer, PeerOptions};

mod connections;
mod discovery;
mod lifecycle;
mod messaging;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const INITIATOR_HOST: &str = "127.0.0.1";
pub const ACCEPTOR_HOST: &str = "127.0.0.2";

pub fn options(host: &str) -> PeerOptions {
    let mut options = PeerOptions::new(host, 0);
    options.discovery = None;
    options
}

/// Start a peer on `host` with an OS-assigned port.
pub async fn start_peer(options: PeerOptions) -> Peer {
    let peer = Peer::new(options);
    peer.start().await.expect("peer should start");
    peer
}

/// Start an initiator and an acceptor; the acceptor echoes when `echo` is set.
pub async fn start_pair(echo: bool) -> (Peer, Peer) {
    let initiator = start_peer(options(INITIATOR_HOST)).await;
    let mut acceptor = options(ACCEPTOR_HOST);
    acceptor.echo_inbound = echo;
    (initiator, start_peer(acceptor).await)
}

/// Poll `cond` every 20 ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn stop_all(peers: &[&Peer]) {
    for peer in peers {
        peer.stop().await;
    }
}
