//! /connect and /peers/{id} handlers: opening and dropping connections.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lanlink_core::PeerAddress;

use super::{connection_id, error_response, ApiState};

// ── /connect (POST) ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub id: u64,
    pub address: PeerAddress,
}

pub async fn handle_connect(
    State(state): State<ApiState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, (StatusCode, String)> {
    let id = state
        .peer
        .connect(&req.host, req.port)
        .await
        .map_err(error_response)?;

    tracing::info!(id = %id, host = %req.host, port = req.port, "connected via API");

    Ok(Json(ConnectResponse {
        id: id.get(),
        address: PeerAddress::new(req.host, req.port),
    }))
}

// ── /peers/{id} (DELETE) ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeerDropResponse {
    pub id: u64,
    pub dropped: bool,
}

pub async fn handle_peer_drop(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Json<PeerDropResponse> {
    let dropped = state.peer.disconnect(connection_id(id));

    if dropped {
        tracing::info!(id, "connection dropped via API");
    }

    Json(PeerDropResponse { id, dropped })
}
