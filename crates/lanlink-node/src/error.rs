//! Failure kinds surfaced by the node.

use std::fmt;
use std::time::Duration;

use lanlink_core::PeerAddress;

use crate::registry::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("refusing to connect to self ({0})")]
    SelfConnect(PeerAddress),

    #[error("already connected to {addr} as connection {id}")]
    AlreadyConnected { addr: PeerAddress, id: ConnectionId },

    #[error("a dial to {0} is already in progress")]
    DialInProgress(PeerAddress),

    #[error("{local} does not initiate towards {remote}; waiting for it to dial in")]
    NotInitiator {
        local: PeerAddress,
        remote: PeerAddress,
    },

    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: PeerAddress,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {addr} timed out after {timeout:?}")]
    DialTimeout { addr: PeerAddress, timeout: Duration },

    #[error("connection {0} not found")]
    NotFound(ConnectionId),

    #[error("write to connection {id} failed: {source}")]
    Send {
        id: ConnectionId,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind TCP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("multicast setup failed ({what}): {source}")]
    Multicast {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("peer already started")]
    AlreadyStarted,
}

impl Error {
    pub(crate) fn multicast(what: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Error::Multicast { what, source }
    }

    pub(crate) fn bind(addr: impl fmt::Display) -> impl FnOnce(std::io::Error) -> Self {
        let addr = addr.to_string();
        move |source| Error::Bind { addr, source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
