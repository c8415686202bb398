use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;

use lanlink_core::PeerAddress;
use lanlink_node::{Direction, Error};

use crate::*;

#[tokio::test]
async fn test_lower_node_dials_higher() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = acceptor.local_address();

    let id = initiator.connect(&target.host, target.port).await?;

    let peers = initiator.list_peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, id);
    assert_eq!(peers[0].address, target);
    assert_eq!(peers[0].direction, Direction::Outbound);

    assert!(wait_until(Duration::from_secs(2), || acceptor.connection_count() == 1).await);
    assert_eq!(acceptor.list_peers()[0].direction, Direction::Inbound);

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_higher_node_refuses_to_dial() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = initiator.local_address();

    let err = acceptor.connect(&target.host, target.port).await.unwrap_err();
    assert!(matches!(err, Error::NotInitiator { .. }), "got {err}");
    assert_eq!(acceptor.connection_count(), 0);
    assert_eq!(initiator.connection_count(), 0);

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_self_connect_refused() -> Result<()> {
    let peer = start_peer(options(INITIATOR_HOST)).await;
    let me = peer.local_address();

    let err = peer.connect(&me.host, me.port).await.unwrap_err();
    assert!(matches!(err, Error::SelfConnect(_)), "got {err}");

    peer.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_second_connect_reports_existing() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = acceptor.local_address();

    let first = initiator.connect(&target.host, target.port).await?;
    match initiator.connect(&target.host, target.port).await {
        Err(Error::AlreadyConnected { id, .. }) => assert_eq!(id, first),
        other => panic!("expected AlreadyConnected, got {other:?}"),
    }
    assert_eq!(initiator.connection_count(), 1);

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

/// Racing dials to one address must produce exactly one connection.
#[tokio::test]
async fn test_concurrent_dials_yield_one_connection() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = acceptor.local_address();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let peer = initiator.clone();
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            peer.connect(&target.host, target.port).await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => ok += 1,
            Err(Error::AlreadyConnected { .. } | Error::DialInProgress(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(initiator.connection_count(), 1);
    assert!(wait_until(Duration::from_secs(2), || acceptor.connection_count() == 1).await);

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_dial_to_closed_port_fails() -> Result<()> {
    let initiator = start_peer(options(INITIATOR_HOST)).await;

    let port = {
        let probe = TcpListener::bind((ACCEPTOR_HOST, 0)).await?;
        probe.local_addr()?.port()
    };

    let err = initiator.connect(ACCEPTOR_HOST, port).await.unwrap_err();
    assert!(
        matches!(err, Error::Dial { .. } | Error::DialTimeout { .. }),
        "got {err}"
    );
    assert_eq!(initiator.connection_count(), 0);

    // the failed dial released its reservation
    assert!(initiator
        .registry()
        .reserve_dial(&PeerAddress::new(ACCEPTOR_HOST, port))
        .is_ok());

    initiator.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_closes_both_sides() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = acceptor.local_address();

    let id = initiator.connect(&target.host, target.port).await?;
    assert!(wait_until(Duration::from_secs(2), || acceptor.connection_count() == 1).await);

    assert!(initiator.disconnect(id));
    assert!(!initiator.disconnect(id));
    assert_eq!(initiator.connection_count(), 0);
    assert!(wait_until(Duration::from_secs(2), || acceptor.connection_count() == 0).await);

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_peers_dialed_on_start() -> Result<()> {
    let acceptor = start_peer(options(ACCEPTOR_HOST)).await;

    let mut opts = options(INITIATOR_HOST);
    opts.bootstrap = vec![
        acceptor.local_address(),
        // unreachable entries are skipped, not fatal
        PeerAddress::new(ACCEPTOR_HOST, 1),
    ];
    let initiator = start_peer(opts).await;

    assert_eq!(initiator.connection_count(), 1);
    assert_eq!(initiator.list_peers()[0].address, acceptor.local_address());

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}
