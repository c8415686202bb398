//! lanlinkd: LAN peer-to-peer daemon.

use anyhow::{Context, Result};
use clap::Parser;

use lanlink_core::config::LanlinkConfig;
use lanlink_node::{Peer, PeerOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "LAN peer-to-peer node", long_about = None)]
struct Args {
    /// Bind host, also advertised to other nodes.
    #[arg(long)]
    host: Option<String>,

    /// TCP listen port (0 = OS-assigned).
    #[arg(long)]
    port: Option<u16>,

    /// Peer to dial at startup, as host:port. Repeatable.
    #[arg(long = "bootstrap", value_name = "HOST:PORT")]
    bootstrap: Vec<String>,

    /// Disable multicast discovery.
    #[arg(long = "no-discovery", default_value_t = false)]
    no_discovery: bool,

    /// Control API port on 127.0.0.1.
    #[arg(long = "api-port")]
    api_port: Option<u16>,
}

impl Args {
    fn apply(self, config: &mut LanlinkConfig) {
        if let Some(host) = self.host {
            config.node.host = host;
        }
        if let Some(port) = self.port {
            config.node.port = port;
        }
        if !self.bootstrap.is_empty() {
            config.node.bootstrap = self.bootstrap;
        }
        if self.no_discovery {
            config.discovery.enabled = false;
        }
        if let Some(port) = self.api_port {
            config.api.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Load config
    if let Err(e) = LanlinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = LanlinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LanlinkConfig::default()
    });
    args.apply(&mut config);

    if config.discovery.enabled && config.node.host == "0.0.0.0" {
        tracing::warn!("bind host 0.0.0.0 is advertised as-is; other nodes cannot dial it");
    }

    let options = PeerOptions::from_config(&config).context("invalid configuration")?;
    tracing::info!(
        host = %options.host,
        port = options.port,
        bootstrap = options.bootstrap.len(),
        discovery = options.discovery.is_some(),
        "lanlinkd starting"
    );

    // ── Start node ───────────────────────────────────────────────────────────

    let peer = Peer::new(options);
    peer.start_listener()
        .await
        .context("failed to start TCP listener")?;
    peer.start_reaper();
    if let Err(e) = peer.start_discovery().await {
        tracing::error!(error = %e, "discovery unavailable, continuing without it");
    }
    peer.dial_bootstrap().await;

    tracing::info!(addr = %peer.local_address(), "node ready");

    // ── Shutdown channel ─────────────────────────────────────────────────────

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut shutdown_rx = shutdown_tx.subscribe();

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Control API ──────────────────────────────────────────────────────────

    if config.api.enabled {
        let state = lanlink_api::ApiState {
            peer: peer.clone(),
            shutdown_tx: shutdown_tx.clone(),
        };
        let api_port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = lanlink_api::serve(state, api_port).await {
                tracing::error!(error = %e, "control API failed");
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let _ = shutdown_rx.recv().await;
    tracing::info!("shutting down");
    peer.stop().await;

    Ok(())
}
