//! HTTP API handlers: exposes node state and operations as JSON.

pub mod connections;
pub mod messages;
pub mod status;

use axum::http::StatusCode;

use lanlink_node::{ConnectionId, Error, Peer};

#[derive(Clone)]
pub struct ApiState {
    pub peer: Peer,
    /// Fired to ask the daemon to stop the node.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Map a node error to the status code and message returned to the client.
pub fn error_response(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyConnected { .. } | Error::DialInProgress(_) => StatusCode::CONFLICT,
        Error::SelfConnect(_) | Error::NotInitiator { .. } | Error::InvalidAddress(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Error::Dial { .. } | Error::DialTimeout { .. } | Error::Send { .. } => {
            StatusCode::BAD_GATEWAY
        }
        Error::Bind { .. } | Error::Multicast { .. } | Error::AlreadyStarted => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn connection_id(raw: u64) -> ConnectionId {
    ConnectionId::from(raw)
}

pub use connections::{handle_connect, handle_peer_drop};
pub use messages::{handle_broadcast, handle_send};
pub use status::{handle_discovered, handle_peers, handle_shutdown, handle_status};
