use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Result;

use lanlink_node::{DiscoveryOptions, Peer};

use crate::*;

/// Multicast needs a real interface; skip unless explicitly enabled.
fn multicast_available() -> bool {
    std::env::var("LANLINK_MULTICAST_TESTS").is_ok_and(|v| v == "1")
}

fn discovering(host: &str, group_port: u16) -> lanlink_node::PeerOptions {
    let mut o = options(host);
    o.discovery = Some(DiscoveryOptions {
        group: Ipv4Addr::new(239, 255, 0, 1),
        port: group_port,
        ttl: 1,
        announce_interval: Duration::from_millis(200),
        peer_ttl: Duration::from_secs(3),
    });
    o
}

/// Two nodes that only know the group find each other and end up with
/// exactly one connection between them.
#[tokio::test]
async fn test_discovery_connects_once() -> Result<()> {
    if !multicast_available() {
        eprintln!("SKIP: set LANLINK_MULTICAST_TESTS=1 to run multicast tests");
        return Ok(());
    }

    // wildcard bind: multicast goes out on the default interface
    let a = start_peer(discovering("0.0.0.0", 39_999)).await;
    let b = start_peer(discovering("0.0.0.0", 39_999)).await;

    let connected = |p: &Peer| p.connection_count() == 1;
    assert!(
        wait_until(Duration::from_secs(5), || connected(&a) && connected(&b)).await,
        "peers did not connect via discovery"
    );

    // several more announcement rounds must not add duplicates
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(a.connection_count(), 1);
    assert_eq!(b.connection_count(), 1);
    assert_eq!(a.discovered_peers().len(), 1);
    assert_eq!(b.discovered_peers().len(), 1);

    stop_all(&[&a, &b]).await;
    Ok(())
}
