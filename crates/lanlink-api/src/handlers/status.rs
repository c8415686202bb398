//! /status, /peers, /discovered, /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use lanlink_core::{Framing, PeerAddress};
use lanlink_node::PeerInfo;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub local: PeerAddress,
    pub connections: usize,
    pub peers_discovered: usize,
    pub discovery_enabled: bool,
    pub framing: Framing,
    pub echo_inbound: bool,
    pub idle_timeout_secs: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let options = state.peer.options();
    Json(StatusResponse {
        local: state.peer.local_address(),
        connections: state.peer.connection_count(),
        peers_discovered: state.peer.discovered().len(),
        discovery_enabled: options.discovery.is_some(),
        framing: options.framing,
        echo_inbound: options.echo_inbound,
        idle_timeout_secs: options.idle_timeout.as_secs(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    Json(PeersResponse {
        peers: state.peer.list_peers(),
    })
}

// ── /discovered ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct DiscoveredResponse {
    pub peers: Vec<DiscoveredInfo>,
}

#[derive(Serialize)]
pub struct DiscoveredInfo {
    pub address: PeerAddress,
    pub source: String,
    pub last_seen_secs: u64,
    /// Live connection to this address, if any.
    pub connection: Option<u64>,
}

pub async fn handle_discovered(State(state): State<ApiState>) -> Json<DiscoveredResponse> {
    let registry = state.peer.registry();
    let peers = state
        .peer
        .discovered_peers()
        .into_iter()
        .map(|p| DiscoveredInfo {
            connection: registry.find_by_address(&p.address).map(|id| id.get()),
            source: p.source.to_string(),
            last_seen_secs: p.last_seen.elapsed().as_secs(),
            address: p.address,
        })
        .collect();

    Json(DiscoveredResponse { peers })
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
