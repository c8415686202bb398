use std::time::Duration;

use anyhow::Result;

use lanlink_node::{Error, Peer};

use crate::*;

#[tokio::test]
async fn test_idle_connections_reaped_on_both_sides() -> Result<()> {
    let quick = |host| {
        let mut o = options(host);
        o.idle_timeout = Duration::from_millis(300);
        o.reaper_interval = Duration::from_millis(50);
        o
    };
    let initiator = start_peer(quick(INITIATOR_HOST)).await;
    let acceptor = start_peer(quick(ACCEPTOR_HOST)).await;

    let target = acceptor.local_address();
    initiator.connect(&target.host, target.port).await?;
    assert!(wait_until(Duration::from_secs(2), || acceptor.connection_count() == 1).await);

    assert!(
        wait_until(Duration::from_secs(3), || {
            initiator.connection_count() == 0 && acceptor.connection_count() == 0
        })
        .await,
        "idle connection was not reaped"
    );

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_traffic_keeps_connection_alive() -> Result<()> {
    let mut opts = options(INITIATOR_HOST);
    opts.idle_timeout = Duration::from_millis(600);
    opts.reaper_interval = Duration::from_millis(50);
    let initiator = start_peer(opts).await;
    let acceptor = start_peer(options(ACCEPTOR_HOST)).await;

    let target = acceptor.local_address();
    let id = initiator.connect(&target.host, target.port).await?;

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        initiator.send(id, "tick").await?;
    }
    assert!(initiator.registry().get(id).is_some());

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_stop_closes_every_connection() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = acceptor.local_address();
    initiator.connect(&target.host, target.port).await?;
    assert!(wait_until(Duration::from_secs(2), || acceptor.connection_count() == 1).await);

    tokio::time::timeout(Duration::from_secs(5), initiator.stop()).await?;
    assert!(initiator.is_stopped());
    assert_eq!(initiator.connection_count(), 0);

    // the far side sees EOF
    assert!(wait_until(Duration::from_secs(2), || acceptor.connection_count() == 0).await);

    // the listener is gone too
    let err = tokio::net::TcpStream::connect((
        initiator.local_address().host.as_str(),
        initiator.local_address().port,
    ))
    .await;
    assert!(err.is_err(), "listener still accepting after stop");

    acceptor.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_start_rejected_twice_and_on_busy_port() -> Result<()> {
    let peer = start_peer(options(INITIATOR_HOST)).await;
    assert!(matches!(peer.start().await, Err(Error::AlreadyStarted)));

    let taken = peer.local_address();
    let clash = Peer::new(options_on(INITIATOR_HOST, taken.port));
    assert!(matches!(clash.start().await, Err(Error::Bind { .. })));

    peer.stop().await;
    Ok(())
}

fn options_on(host: &str, port: u16) -> lanlink_node::PeerOptions {
    let mut o = options(host);
    o.port = port;
    o
}
