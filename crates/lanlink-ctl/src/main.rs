//! lanlink-ctl: command-line interface for the lanlink daemon.

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};

const DEFAULT_PORT: u16 = 9101;

#[derive(Parser)]
#[command(author, version, about = "Control a running lanlinkd", long_about = None)]
struct Cli {
    /// Control API port.
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show node address, connection count and settings
    Status,
    /// List live connections
    Peers,
    /// List nodes heard over multicast
    Discovered,
    /// Open a connection to HOST PORT
    Connect {
        host: String,
        #[arg(value_name = "PORT")]
        peer_port: u16,
    },
    /// Send TEXT on connection ID
    Send {
        id: u64,
        text: String,
        /// Wait for the next message on the connection
        #[arg(long)]
        wait: bool,
        /// Wait timeout in seconds (daemon default if omitted)
        #[arg(long, requires = "wait")]
        timeout: Option<u64>,
    },
    /// Send TEXT on every connection
    Broadcast { text: String },
    /// Close connection ID
    Drop { id: u64 },
    /// Stop the daemon
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let port = cli.port;

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => cmd::status::cmd_status(port).await,
        Command::Peers => cmd::status::cmd_peers(port).await,
        Command::Discovered => cmd::status::cmd_discovered(port).await,
        Command::Connect { host, peer_port } => {
            cmd::connections::cmd_connect(port, &host, peer_port).await
        }
        Command::Send {
            id,
            text,
            wait,
            timeout,
        } => cmd::messages::cmd_send(port, id, &text, wait, timeout).await,
        Command::Broadcast { text } => cmd::messages::cmd_broadcast(port, &text).await,
        Command::Drop { id } => cmd::connections::cmd_drop(port, id).await,
        Command::Shutdown => cmd::status::cmd_shutdown(port).await,
    }
}
