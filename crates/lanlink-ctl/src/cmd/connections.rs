//! Connect and drop commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, delete_json, post_json_body};

#[derive(Serialize)]
struct ConnectRequest<'a> {
    host: &'a str,
    port: u16,
}

#[derive(Deserialize)]
struct ConnectResponse {
    id: u64,
}

#[derive(Deserialize)]
struct DropResponse {
    id: u64,
    dropped: bool,
}

pub async fn cmd_connect(port: u16, host: &str, peer_port: u16) -> Result<()> {
    let req = ConnectRequest {
        host,
        port: peer_port,
    };
    let resp: ConnectResponse =
        post_json_body(&format!("{}/connect", base_url(port)), &req).await?;
    println!("Connected to {}:{} as #{}", host, peer_port, resp.id);
    Ok(())
}

pub async fn cmd_drop(port: u16, id: u64) -> Result<()> {
    let resp: DropResponse = delete_json(&format!("{}/peers/{}", base_url(port), id)).await?;
    if resp.dropped {
        println!("Dropped connection #{}", resp.id);
    } else {
        println!("No connection #{}", resp.id);
    }
    Ok(())
}
