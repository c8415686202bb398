//! Connection registry: the single source of truth for live TCP sessions.
//!
//! One `std::sync::Mutex` guards the whole table. It is never held across an
//! `.await`: operations that need to wait (writing to a socket, popping a
//! message) clone the per-connection handle out of the table and release the
//! lock first.
//!
//! Each slot owns three things besides the public entry:
//! - the sending side of the connection's message queue,
//! - the receiving side, shared with whoever pops,
//! - a close signal whose drop tells the session task to stop reading.
//!
//! Removing a slot therefore closes the write half, wakes the reader, and
//! ends any pending pop in one step.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use lanlink_core::PeerAddress;

use crate::error::{Error, Result};

/// Write half of a session, type-erased so tests can use in-memory pipes.
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writer shared between the registry and whoever is currently sending.
pub type SharedWriter = Arc<tokio::sync::Mutex<SessionWriter>>;

type SharedQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>;

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Process-unique connection identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side opened the TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("in"),
            Direction::Outbound => f.write_str("out"),
        }
    }
}

// ── Entries ───────────────────────────────────────────────────────────────────

/// Public view of a live connection.
#[derive(Clone)]
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub address: PeerAddress,
    pub direction: Direction,
    /// Last time data moved on this connection. Only `touch` advances it.
    pub last_activity: Instant,
    writer: SharedWriter,
}

impl ConnectionEntry {
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity)
    }

    pub(crate) fn writer(&self) -> &SharedWriter {
        &self.writer
    }
}

impl fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("direction", &self.direction)
            .field("last_activity", &self.last_activity)
            .finish_non_exhaustive()
    }
}

struct Slot {
    entry: ConnectionEntry,
    inbox: mpsc::Sender<String>,
    queue: SharedQueue,
    _close: oneshot::Sender<()>,
}

/// Resolves once the connection has been removed from the registry.
pub struct CloseSignal(oneshot::Receiver<()>);

impl CloseSignal {
    /// Wait for removal. Must not be awaited again after it returns.
    pub async fn closed(&mut self) {
        let _ = (&mut self.0).await;
    }
}

/// Result of registering a connection: its id and its close signal.
pub struct Registered {
    pub id: ConnectionId,
    pub closed: CloseSignal,
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct Inner {
    next_id: u64,
    slots: HashMap<ConnectionId, Slot>,
    /// Addresses with an outbound dial in flight.
    dialing: HashSet<PeerAddress>,
}

/// Thread-safe connection table. Cheap to clone; clones share the table.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<Inner>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                slots: HashMap::new(),
                dialing: HashSet::new(),
            })),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a slot half-inserted,
        // so a poisoned table is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection. No duplicate check; see [`Self::reserve_dial`].
    pub fn add<W>(&self, writer: W, address: PeerAddress, direction: Direction) -> Registered
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut inner = self.lock();
        self.insert_locked(&mut inner, Box::new(writer), address, direction)
    }

    fn insert_locked(
        &self,
        inner: &mut Inner,
        writer: SessionWriter,
        address: PeerAddress,
        direction: Direction,
    ) -> Registered {
        let id = ConnectionId(inner.next_id);
        inner.next_id += 1;

        let (inbox, queue) = mpsc::channel(self.queue_capacity);
        let (close_tx, close_rx) = oneshot::channel();

        inner.slots.insert(
            id,
            Slot {
                entry: ConnectionEntry {
                    id,
                    address,
                    direction,
                    last_activity: Instant::now(),
                    writer: Arc::new(tokio::sync::Mutex::new(writer)),
                },
                inbox,
                queue: Arc::new(tokio::sync::Mutex::new(queue)),
                _close: close_tx,
            },
        );

        Registered {
            id,
            closed: CloseSignal(close_rx),
        }
    }

    /// Atomically check that `address` has no connection and no dial in
    /// flight, and mark it as being dialed.
    pub fn reserve_dial(&self, address: &PeerAddress) -> Result<DialReservation> {
        let mut inner = self.lock();

        if let Some(id) = find_locked(&inner, address) {
            return Err(Error::AlreadyConnected {
                addr: address.clone(),
                id,
            });
        }
        if !inner.dialing.insert(address.clone()) {
            return Err(Error::DialInProgress(address.clone()));
        }

        Ok(DialReservation {
            registry: self.clone(),
            address: address.clone(),
            committed: false,
        })
    }

    /// Mark activity on a connection. Unknown ids are ignored.
    pub fn touch(&self, id: ConnectionId) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(&id) {
            let now = Instant::now();
            if now > slot.entry.last_activity {
                slot.entry.last_activity = now;
            }
        }
    }

    /// Remove a connection and close its socket. Idempotent.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let slot = self.lock().slots.remove(&id);
        match slot {
            Some(slot) => {
                tracing::debug!(id = %id, peer = %slot.entry.address, "connection removed");
                drop(slot);
                true
            }
            None => false,
        }
    }

    /// Remove every connection. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let slots: Vec<Slot> = {
            let mut inner = self.lock();
            inner.slots.drain().map(|(_, slot)| slot).collect()
        };
        slots.len()
    }

    pub fn find_by_address(&self, address: &PeerAddress) -> Option<ConnectionId> {
        find_locked(&self.lock(), address)
    }

    /// Connections silent for at least `threshold`. Nothing is removed.
    pub fn find_idle(&self, threshold: Duration) -> Vec<(ConnectionId, PeerAddress)> {
        let now = Instant::now();
        let inner = self.lock();
        let mut idle: Vec<_> = inner
            .slots
            .values()
            .filter(|slot| now.saturating_duration_since(slot.entry.last_activity) >= threshold)
            .map(|slot| (slot.entry.id, slot.entry.address.clone()))
            .collect();
        idle.sort_by_key(|(id, _)| *id);
        idle
    }

    /// Queue a received message. Dropped if the connection is gone or its
    /// queue is full.
    pub fn push_message(&self, id: ConnectionId, text: String) {
        let inner = self.lock();
        let Some(slot) = inner.slots.get(&id) else {
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = slot.inbox.try_send(text) {
            tracing::warn!(id = %id, capacity = self.queue_capacity, "message queue full, dropping");
        }
    }

    /// Wait up to `timeout` for the next message on a connection.
    ///
    /// `Ok(None)` on timeout or if the connection closes while waiting.
    pub async fn pop_message(&self, id: ConnectionId, timeout: Duration) -> Result<Option<String>> {
        let queue = {
            let inner = self.lock();
            inner
                .slots
                .get(&id)
                .map(|slot| slot.queue.clone())
                .ok_or(Error::NotFound(id))?
        };

        let next = async {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        Ok(tokio::time::timeout(timeout, next).await.ok().flatten())
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.lock().slots.get(&id).map(|slot| slot.entry.clone())
    }

    /// Point-in-time copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<(ConnectionId, ConnectionEntry)> {
        let inner = self.lock();
        let mut entries: Vec<_> = inner
            .slots
            .iter()
            .map(|(id, slot)| (*id, slot.entry.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn find_locked(inner: &Inner, address: &PeerAddress) -> Option<ConnectionId> {
    inner
        .slots
        .values()
        .find(|slot| &slot.entry.address == address)
        .map(|slot| slot.entry.id)
}

// ── Dial reservations ─────────────────────────────────────────────────────────

/// An outbound dial in flight. Commit it once the socket is connected;
/// dropping it releases the address.
pub struct DialReservation {
    registry: ConnectionRegistry,
    address: PeerAddress,
    committed: bool,
}

impl DialReservation {
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// Turn the reservation into an outbound connection entry.
    pub fn commit<W>(mut self, writer: W) -> Registered
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let registry = self.registry.clone();
        let mut inner = registry.lock();
        inner.dialing.remove(&self.address);
        self.committed = true;
        registry.insert_locked(
            &mut inner,
            Box::new(writer),
            self.address.clone(),
            Direction::Outbound,
        )
    }
}

impl Drop for DialReservation {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.lock().dialing.remove(&self.address);
        }
    }
}
