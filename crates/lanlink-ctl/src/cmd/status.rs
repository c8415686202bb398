//! Status, peer listing and daemon shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct Address {
    host: String,
    port: u16,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    local: Address,
    connections: usize,
    peers_discovered: usize,
    discovery_enabled: bool,
    framing: String,
    echo_inbound: bool,
    idle_timeout_secs: u64,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    id: u64,
    address: Address,
    direction: String,
    idle_secs: u64,
}

#[derive(Deserialize)]
struct DiscoveredResponse {
    peers: Vec<DiscoveredInfo>,
}

#[derive(Deserialize)]
struct DiscoveredInfo {
    address: Address,
    source: String,
    last_seen_secs: u64,
    connection: Option<u64>,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  lanlink Node Status");
    println!("═══════════════════════════════════════");
    println!("  Address          : {}", resp.local);
    println!("  Connections      : {}", resp.connections);
    println!(
        "  Discovery        : {}",
        if resp.discovery_enabled { "on" } else { "off" }
    );
    println!("  Peers discovered : {}", resp.peers_discovered);
    println!("  Framing          : {}", resp.framing);
    println!("  Echo inbound     : {}", resp.echo_inbound);
    println!("  Idle timeout     : {}s", resp.idle_timeout_secs);

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No active connections.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Connections ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  ┌─ #{}", p.id);
        println!("  │  address   : {}", p.address);
        println!("  │  direction : {}", p.direction);
        println!("  └─ idle      : {}s", p.idle_secs);
    }

    Ok(())
}

pub async fn cmd_discovered(port: u16) -> Result<()> {
    let resp: DiscoveredResponse = get_json(&format!("{}/discovered", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers discovered yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Discovered Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        let connection = match p.connection {
            Some(id) => format!("#{}", id),
            None => "none".to_string(),
        };
        println!("  ┌─ {}", p.address);
        println!("  │  source     : {}", p.source);
        println!("  │  connection : {}", connection);
        println!("  └─ last seen  : {}s ago", p.last_seen_secs);
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
