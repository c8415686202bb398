//! Send and broadcast commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

#[derive(Serialize)]
struct SendRequest<'a> {
    id: u64,
    text: &'a str,
    wait: bool,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
struct SendResponse {
    reply: Option<String>,
}

#[derive(Serialize)]
struct BroadcastRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BroadcastResponse {
    delivered: Vec<u64>,
    failed: Vec<(u64, String)>,
}

pub async fn cmd_send(
    port: u16,
    id: u64,
    text: &str,
    wait: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let req = SendRequest {
        id,
        text,
        wait,
        timeout_secs,
    };
    let resp: SendResponse = post_json_body(&format!("{}/send", base_url(port)), &req).await?;

    println!("Sent to #{}", id);
    if wait {
        match resp.reply {
            Some(reply) => println!("Reply: {}", reply),
            None => println!("No reply before timeout."),
        }
    }
    Ok(())
}

pub async fn cmd_broadcast(port: u16, text: &str) -> Result<()> {
    let req = BroadcastRequest { text };
    let resp: BroadcastResponse =
        post_json_body(&format!("{}/broadcast", base_url(port)), &req).await?;

    println!(
        "Delivered to {} connection(s), {} failed.",
        resp.delivered.len(),
        resp.failed.len()
    );
    for (id, error) in &resp.failed {
        println!("  #{}: {}", id, error);
    }
    Ok(())
}
