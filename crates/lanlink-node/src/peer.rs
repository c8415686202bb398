//! Peer: the node façade.
//!
//! Owns the registry, the discovered-peer table, the shutdown signal and
//! every background task. Cheap to clone; clones share one node. Background
//! tasks hold clones too, so a started peer lives until [`Peer::stop`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::{JoinHandle, JoinSet};

use lanlink_core::config::LanlinkConfig;
use lanlink_core::wire::Announcement;
use lanlink_core::{should_initiate, Framing, PeerAddress};

use crate::discovery::{self, announcer, listener as discovery_listener};
use crate::discovery::{DiscoveredPeer, DiscoveredPeers, DiscoveryOptions};
use crate::error::{Error, Result};
use crate::lifecycle::{self, ShutdownTrigger, TaskSet};
use crate::registry::{ConnectionId, ConnectionRegistry, Direction, Registered};
use crate::session::{self, SessionTask};
use crate::{listener, reaper};

// ── Options ───────────────────────────────────────────────────────────────────

/// Runtime settings for a peer. Built from [`LanlinkConfig`] by the daemon,
/// or directly in tests.
#[derive(Debug, Clone)]
pub struct PeerOptions {
    /// Bind host, also advertised to other nodes.
    pub host: String,
    /// Bind port. 0 = OS-assigned; the assigned port is advertised.
    pub port: u16,
    pub bootstrap: Vec<PeerAddress>,
    /// `None` disables multicast discovery.
    pub discovery: Option<DiscoveryOptions>,
    pub idle_timeout: Duration,
    pub send_wait_timeout: Duration,
    pub connect_timeout: Duration,
    /// Deadline for writing one message, including the wait for the
    /// connection's writer.
    pub write_timeout: Duration,
    pub reaper_interval: Duration,
    pub queue_capacity: usize,
    pub framing: Framing,
    pub echo_inbound: bool,
}

impl PeerOptions {
    /// Defaults from [`LanlinkConfig::default`] with the given bind address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let config = LanlinkConfig::default();
        let mut options = Self::assemble(&config, Vec::new());
        options.host = host.into();
        options.port = port;
        options.discovery = DiscoveryOptions::from_config(&config.discovery).ok();
        options
    }

    pub fn from_config(config: &LanlinkConfig) -> Result<Self> {
        let bootstrap = config
            .node
            .bootstrap
            .iter()
            .map(|s| s.parse().map_err(|_| Error::InvalidAddress(s.clone())))
            .collect::<Result<Vec<PeerAddress>>>()?;

        let mut options = Self::assemble(config, bootstrap);
        if config.discovery.enabled {
            options.discovery = Some(DiscoveryOptions::from_config(&config.discovery)?);
        }
        Ok(options)
    }

    fn assemble(config: &LanlinkConfig, bootstrap: Vec<PeerAddress>) -> Self {
        Self {
            host: config.node.host.clone(),
            port: config.node.port,
            bootstrap,
            discovery: None,
            idle_timeout: config.session.idle_timeout(),
            send_wait_timeout: config.session.send_wait_timeout(),
            connect_timeout: config.session.connect_timeout(),
            write_timeout: config.session.write_timeout(),
            reaper_interval: config.session.reaper_interval(),
            queue_capacity: config.session.queue_capacity,
            framing: config.session.framing,
            echo_inbound: config.session.echo_inbound,
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// One row of [`Peer::list_peers`].
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: ConnectionId,
    pub address: PeerAddress,
    pub direction: Direction,
    pub idle_secs: u64,
}

/// Outcome of a broadcast. Failures are per connection, never fatal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastReport {
    pub delivered: Vec<ConnectionId>,
    pub failed: Vec<(ConnectionId, String)>,
}

// ── Peer ──────────────────────────────────────────────────────────────────────

struct PeerInner {
    options: PeerOptions,
    /// Advertised address, fixed once the listener is bound.
    local: OnceLock<PeerAddress>,
    registry: ConnectionRegistry,
    discovered: DiscoveredPeers,
    shutdown: ShutdownTrigger,
    sessions: TaskSet,
    background: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    started: AtomicBool,
}

#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

impl Peer {
    pub fn new(options: PeerOptions) -> Self {
        let (shutdown, _) = lifecycle::channel();
        Self {
            inner: Arc::new(PeerInner {
                registry: ConnectionRegistry::new(options.queue_capacity),
                options,
                local: OnceLock::new(),
                discovered: DiscoveredPeers::new(),
                shutdown,
                sessions: TaskSet::default(),
                background: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &PeerOptions {
        &self.inner.options
    }

    /// This node's `(host, port)` as advertised and used for tie-breaks.
    pub fn local_address(&self) -> PeerAddress {
        self.inner.local.get().cloned().unwrap_or_else(|| {
            PeerAddress::new(self.inner.options.host.clone(), self.inner.options.port)
        })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn discovered(&self) -> &DiscoveredPeers {
        &self.inner.discovered
    }

    /// Nodes heard on the multicast group and not yet expired.
    pub fn discovered_peers(&self) -> Vec<DiscoveredPeer> {
        self.inner.discovered.list()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Start every subsystem: listener, reaper, discovery (if enabled), then
    /// dial the bootstrap list. Fails on the first subsystem that cannot
    /// start.
    pub async fn start(&self) -> Result<()> {
        self.start_listener().await?;
        self.start_reaper();
        if self.inner.options.discovery.is_some() {
            self.start_discovery().await?;
        }
        self.dial_bootstrap().await;
        Ok(())
    }

    /// Bind the TCP listener and spawn the accept loop.
    pub async fn start_listener(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let host = self.inner.options.host.clone();
        let port = self.inner.options.port;
        let bind = format!("{host}:{port}");

        let bound = async {
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            let local = listener.local_addr()?;
            Ok::<_, std::io::Error>((listener, local))
        }
        .await;

        let (tcp, local) = match bound {
            Ok(r) => r,
            Err(e) => {
                self.inner.started.store(false, Ordering::SeqCst);
                return Err(Error::bind(&bind)(e));
            }
        };

        let advertised = PeerAddress::new(host, local.port());
        let _ = self.inner.local.set(advertised.clone());
        tracing::info!(addr = %advertised, "tcp listener bound");

        let handle = tokio::spawn(listener::accept_loop(
            tcp,
            self.clone(),
            self.inner.shutdown.subscribe(),
        ));
        self.track("tcp-listener", handle);
        Ok(())
    }

    /// Spawn the idle reaper.
    pub fn start_reaper(&self) {
        let handle = tokio::spawn(reaper::reaper_loop(
            self.inner.registry.clone(),
            self.inner.options.idle_timeout,
            self.inner.options.reaper_interval,
            self.inner.shutdown.subscribe(),
        ));
        self.track("idle-reaper", handle);
    }

    /// Create the multicast sockets and spawn announcer and listener.
    ///
    /// Both sockets are set up before either task starts, so a failure
    /// leaves discovery entirely off and the rest of the node untouched.
    pub async fn start_discovery(&self) -> Result<()> {
        let Some(options) = self.inner.options.discovery.clone() else {
            return Ok(());
        };
        let interface = discovery::interface_for(&self.inner.options.host);

        let listen = discovery_listener::make_listener_socket(options.group, options.port, interface)?;
        let listen = UdpSocket::from_std(listen).map_err(Error::multicast("register socket"))?;
        let announce = announcer::make_announce_socket(interface, options.ttl)?;
        let announce = UdpSocket::from_std(announce).map_err(Error::multicast("register socket"))?;

        let handle = tokio::spawn(discovery_listener::listener_loop(
            listen,
            self.clone(),
            options.clone(),
            self.inner.shutdown.subscribe(),
        ));
        self.track("discovery-listener", handle);

        let handle = tokio::spawn(announcer::announce_loop(
            announce,
            Announcement::new(self.local_address()),
            options,
            self.inner.shutdown.subscribe(),
        ));
        self.track("discovery-announcer", handle);
        Ok(())
    }

    /// Dial each bootstrap address once. Failures are logged, not returned.
    pub async fn dial_bootstrap(&self) {
        for addr in &self.inner.options.bootstrap {
            match self.connect(&addr.host, addr.port).await {
                Ok(id) => tracing::info!(id = %id, peer = %addr, "bootstrap peer connected"),
                Err(e) => tracing::warn!(peer = %addr, error = %e, "bootstrap dial skipped"),
            }
        }
    }

    /// Signal shutdown, close every connection, and join every task.
    pub async fn stop(&self) {
        self.inner.shutdown.trigger();
        let closed = self.inner.registry.clear();

        let background = std::mem::take(
            &mut *self
                .inner
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (name, handle) in background {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "background task failed");
            }
        }

        self.inner.sessions.join_all().await;
        // a dial that completed during shutdown may have registered late
        self.inner.registry.clear();

        tracing::info!(closed, "peer stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }

    fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    // ── Connections ───────────────────────────────────────────────────────────

    /// Open an outbound session to `host:port`.
    ///
    /// Refuses self-connections, duplicates, and dials the ordering rule
    /// assigns to the other side.
    pub async fn connect(&self, host: &str, port: u16) -> Result<ConnectionId> {
        let remote = PeerAddress::new(host, port);
        let local = self.local_address();

        if remote == local {
            return Err(Error::SelfConnect(remote));
        }
        let reservation = self.inner.registry.reserve_dial(&remote)?;
        if !should_initiate(&local, &remote) {
            return Err(Error::NotInitiator { local, remote });
        }

        let timeout = self.inner.options.connect_timeout;
        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(Error::Dial { addr: remote, source }),
            Err(_) => return Err(Error::DialTimeout { addr: remote, timeout }),
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "TCP_NODELAY not set");
        }

        let (reader, writer) = stream.into_split();
        let registered = reservation.commit(writer);
        let id = registered.id;
        tracing::info!(id = %id, peer = %remote, "outbound connection established");

        self.spawn_session(registered, reader, remote, Direction::Outbound);
        Ok(id)
    }

    /// Dial in the background; used by discovery so the listener never
    /// blocks on a connect.
    pub(crate) fn spawn_dial(&self, remote: PeerAddress) {
        let peer = self.clone();
        self.inner.sessions.spawn(async move {
            match peer.connect(&remote.host, remote.port).await {
                Ok(_) => {}
                Err(e @ (Error::AlreadyConnected { .. } | Error::DialInProgress(_))) => {
                    tracing::debug!(peer = %remote, reason = %e, "dial skipped");
                }
                Err(e) => tracing::warn!(peer = %remote, error = %e, "dial failed"),
            }
        });
    }

    pub(crate) fn spawn_session<R>(
        &self,
        registered: Registered,
        reader: R,
        address: PeerAddress,
        direction: Direction,
    ) where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
    {
        let task = SessionTask {
            id: registered.id,
            address,
            direction,
            registry: self.inner.registry.clone(),
            framing: self.inner.options.framing,
            echo: self.inner.options.echo_inbound && direction == Direction::Inbound,
            write_timeout: self.inner.options.write_timeout,
        };
        self.inner.sessions.spawn(task.run(
            reader,
            registered.closed,
            self.inner.shutdown.subscribe(),
        ));
    }

    /// Close a connection. Returns false if it did not exist.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.inner.registry.remove(id)
    }

    // ── Messaging ─────────────────────────────────────────────────────────────

    /// Write `text` to one connection. Fails with a `TimedOut` send error if
    /// the write does not finish within `write_timeout`.
    pub async fn send(&self, id: ConnectionId, text: &str) -> Result<()> {
        let entry = self.inner.registry.get(id).ok_or(Error::NotFound(id))?;
        let frame = self.inner.options.framing.encode(text).map_err(|e| Error::Send {
            id,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;

        session::write_frame(entry.writer(), &frame, self.inner.options.write_timeout)
            .await
            .map_err(|source| Error::Send { id, source })?;

        self.inner.registry.touch(id);
        tracing::debug!(id = %id, peer = %entry.address, bytes = frame.len(), "message sent");
        Ok(())
    }

    /// Send, then wait for the next message on the same connection.
    /// `None` uses the configured default wait.
    pub async fn send_and_wait(
        &self,
        id: ConnectionId,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        self.send(id, text).await?;
        let wait = timeout.unwrap_or(self.inner.options.send_wait_timeout);
        self.inner.registry.pop_message(id, wait).await
    }

    /// Best-effort send to every current connection. Sends run
    /// concurrently, so one slow connection costs at most `write_timeout`.
    /// Both lists in the report are in id order.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let text: Arc<str> = Arc::from(text);
        let mut sends = JoinSet::new();
        for (id, entry) in self.inner.registry.snapshot() {
            let peer = self.clone();
            let text = Arc::clone(&text);
            sends.spawn(async move { (id, entry.address, peer.send(id, &text).await) });
        }

        let mut report = BroadcastReport::default();
        while let Some(joined) = sends.join_next().await {
            let (id, address, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "broadcast send task failed");
                    continue;
                }
            };
            match result {
                Ok(()) => report.delivered.push(id),
                Err(e) => {
                    tracing::warn!(id = %id, peer = %address, error = %e, "broadcast send failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        report.delivered.sort_unstable();
        report.failed.sort_unstable_by_key(|(id, _)| *id);
        report
    }

    /// Snapshot of live connections.
    pub fn list_peers(&self) -> Vec<PeerInfo> {
        self.inner
            .registry
            .snapshot()
            .into_iter()
            .map(|(id, entry)| PeerInfo {
                id,
                idle_secs: entry.idle_for().as_secs(),
                address: entry.address,
                direction: entry.direction,
            })
            .collect()
    }
}
