//! /send and /broadcast handlers.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lanlink_node::BroadcastReport;

use super::{connection_id, error_response, ApiState};

// ── /send (POST) ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendRequest {
    pub id: u64,
    pub text: String,
    /// Wait for the next message on the connection after sending.
    #[serde(default)]
    pub wait: bool,
    /// Overrides the configured send-wait timeout.
    pub timeout_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub id: u64,
    pub sent: bool,
    /// Present only when `wait` was set and a message arrived in time.
    pub reply: Option<String>,
}

pub async fn handle_send(
    State(state): State<ApiState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, (StatusCode, String)> {
    let id = connection_id(req.id);

    let reply = if req.wait {
        let timeout = req.timeout_secs.map(Duration::from_secs);
        state
            .peer
            .send_and_wait(id, &req.text, timeout)
            .await
            .map_err(error_response)?
    } else {
        state.peer.send(id, &req.text).await.map_err(error_response)?;
        None
    };

    Ok(Json(SendResponse {
        id: req.id,
        sent: true,
        reply,
    }))
}

// ── /broadcast (POST) ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub text: String,
}

pub async fn handle_broadcast(
    State(state): State<ApiState>,
    Json(req): Json<BroadcastRequest>,
) -> Json<BroadcastReport> {
    let report = state.peer.broadcast(&req.text).await;
    tracing::info!(
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "broadcast via API"
    );
    Json(report)
}
