//! Per-connection session task.
//!
//! One task per socket, inbound or outbound, with the same contract:
//! read → touch → decode → enqueue. The task ends on EOF, read error,
//! framing error, removal from the registry, or node shutdown, and always
//! removes its entry on the way out.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use lanlink_core::{Framing, PeerAddress};

use crate::lifecycle::Shutdown;
use crate::registry::{CloseSignal, ConnectionId, ConnectionRegistry, Direction, SharedWriter};

/// Bytes requested per read. In raw framing this bounds a message's size.
pub const READ_CHUNK: usize = 4096;

pub struct SessionTask {
    pub id: ConnectionId,
    pub address: PeerAddress,
    pub direction: Direction,
    pub registry: ConnectionRegistry,
    pub framing: Framing,
    /// Answer each message with its upper-cased text.
    pub echo: bool,
    pub write_timeout: Duration,
}

impl SessionTask {
    pub async fn run<R>(self, mut reader: R, mut closed: CloseSignal, mut shutdown: Shutdown)
    where
        R: AsyncRead + Unpin,
    {
        tracing::info!(
            id = %self.id,
            peer = %self.address,
            direction = %self.direction,
            "session started"
        );

        let mut buf = BytesMut::with_capacity(READ_CHUNK);

        let reason = loop {
            buf.reserve(READ_CHUNK);
            tokio::select! {
                _ = closed.closed() => break "removed",
                _ = shutdown.wait() => break "shutdown",
                read = reader.read_buf(&mut buf) => match read {
                    Ok(0) => break "closed by peer",
                    Ok(_) => {
                        self.registry.touch(self.id);
                        if let Err(reason) = self.deliver(&mut buf).await {
                            break reason;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(id = %self.id, peer = %self.address, error = %e, "read failed");
                        break "read error";
                    }
                },
            }
        };

        self.registry.remove(self.id);
        tracing::info!(id = %self.id, peer = %self.address, reason, "session ended");
    }

    /// Decode every complete message in `buf` and queue it.
    async fn deliver(&self, buf: &mut BytesMut) -> Result<(), &'static str> {
        loop {
            let text = match self.framing.decode(buf) {
                Ok(Some(text)) => text,
                Ok(None) => return Ok(()),
                Err(e) => {
                    tracing::warn!(id = %self.id, peer = %self.address, error = %e, "framing error");
                    return Err("framing error");
                }
            };

            tracing::debug!(id = %self.id, peer = %self.address, message = %text, "message received");

            let ack = self.echo.then(|| text.to_uppercase());
            self.registry.push_message(self.id, text);

            if let Some(ack) = ack {
                self.acknowledge(&ack).await?;
            }
        }
    }

    async fn acknowledge(&self, ack: &str) -> Result<(), &'static str> {
        let Some(entry) = self.registry.get(self.id) else {
            return Err("removed");
        };
        let frame = self.framing.encode(ack).map_err(|e| {
            tracing::warn!(id = %self.id, error = %e, "ack too large");
            "framing error"
        })?;
        write_frame(entry.writer(), &frame, self.write_timeout).await.map_err(|e| {
            tracing::warn!(id = %self.id, peer = %self.address, error = %e, "ack write failed");
            "write error"
        })
    }
}

/// Write one encoded frame, holding the writer lock for the whole frame so
/// concurrent senders never interleave. Waiting for the lock counts against
/// `deadline`; on expiry the error kind is `TimedOut`.
pub(crate) async fn write_frame(
    writer: &SharedWriter,
    frame: &[u8],
    deadline: Duration,
) -> std::io::Result<()> {
    let write = async {
        let mut w = writer.lock().await;
        w.write_all(frame).await?;
        w.flush().await
    };
    match tokio::time::timeout(deadline, write).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("write not finished after {deadline:?}"),
        )),
    }
}
