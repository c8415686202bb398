use std::time::Duration;

use anyhow::{Context, Result};

use lanlink_core::{Framing, PeerAddress};
use lanlink_node::{ConnectionId, Direction, Error};

use crate::*;

const WAIT: Duration = Duration::from_secs(2);

/// The acceptor's id for its single inbound connection.
async fn inbound_id(acceptor: &lanlink_node::Peer) -> Result<ConnectionId> {
    assert!(wait_until(WAIT, || acceptor.connection_count() == 1).await);
    Ok(acceptor.list_peers().first().context("no inbound connection")?.id)
}

#[tokio::test]
async fn test_send_and_wait_receives_echo() -> Result<()> {
    let (initiator, acceptor) = start_pair(true).await;
    let target = acceptor.local_address();
    let id = initiator.connect(&target.host, target.port).await?;

    let reply = initiator.send_and_wait(id, "hello\n", Some(WAIT)).await?;
    assert_eq!(reply.as_deref(), Some("HELLO"));

    // the acceptor queued the original text
    let inbound = inbound_id(&acceptor).await?;
    let got = acceptor.registry().pop_message(inbound, WAIT).await?;
    assert_eq!(got.as_deref(), Some("hello"));

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_send_and_wait_times_out_without_reply() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = acceptor.local_address();
    let id = initiator.connect(&target.host, target.port).await?;

    let reply = initiator
        .send_and_wait(id, "anyone?", Some(Duration::from_millis(200)))
        .await?;
    assert_eq!(reply, None);

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_acceptor_sends_on_inbound_connection() -> Result<()> {
    let (initiator, acceptor) = start_pair(false).await;
    let target = acceptor.local_address();
    let id = initiator.connect(&target.host, target.port).await?;

    let inbound = inbound_id(&acceptor).await?;
    acceptor.send(inbound, "from the other side").await?;

    let got = initiator.registry().pop_message(id, WAIT).await?;
    assert_eq!(got.as_deref(), Some("from the other side"));

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}

#[tokio::test]
async fn test_send_to_unknown_connection() -> Result<()> {
    let peer = start_peer(options(INITIATOR_HOST)).await;

    let err = peer.send(ConnectionId::from(42), "x").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err}");
    let err = peer
        .send_and_wait(ConnectionId::from(42), "x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err}");

    peer.stop().await;
    Ok(())
}

/// Three connections, one closed by its peer: the broadcast still reaches
/// the other two and reports the dead one.
#[tokio::test]
async fn test_broadcast_reports_failures() -> Result<()> {
    let (initiator, first) = start_pair(false).await;
    let second = start_peer(options(ACCEPTOR_HOST)).await;

    let target = first.local_address();
    let live_first = initiator.connect(&target.host, target.port).await?;

    // a registered connection whose far end is already gone
    let (dead_writer, far_end) = tokio::io::duplex(64);
    drop(far_end);
    let dead = initiator
        .registry()
        .add(dead_writer, PeerAddress::new("127.0.0.9", 9), Direction::Outbound)
        .id;

    let target = second.local_address();
    let live_second = initiator.connect(&target.host, target.port).await?;
    assert_eq!(initiator.connection_count(), 3);

    let report = initiator.broadcast("to everyone").await;
    assert_eq!(report.delivered, vec![live_first, live_second]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, dead);

    for acceptor in [&first, &second] {
        let inbound = inbound_id(acceptor).await?;
        let got = acceptor.registry().pop_message(inbound, WAIT).await?;
        assert_eq!(got.as_deref(), Some("to everyone"));
    }

    stop_all(&[&initiator, &first, &second]).await;
    Ok(())
}

#[tokio::test]
async fn test_length_prefixed_framing_end_to_end() -> Result<()> {
    let mut a = options(INITIATOR_HOST);
    a.framing = Framing::LengthPrefixed;
    let mut b = options(ACCEPTOR_HOST);
    b.framing = Framing::LengthPrefixed;
    b.echo_inbound = true;
    let initiator = start_peer(a).await;
    let acceptor = start_peer(b).await;

    let target = acceptor.local_address();
    let id = initiator.connect(&target.host, target.port).await?;

    for text in ["one", "two words", "three"] {
        let reply = initiator.send_and_wait(id, text, Some(WAIT)).await?;
        assert_eq!(reply.as_deref(), Some(text.to_uppercase().as_str()));
    }

    stop_all(&[&initiator, &acceptor]).await;
    Ok(())
}
