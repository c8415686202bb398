//! lanlink-node: the running node.
//!
//! A [`Peer`] binds a TCP listener, keeps one session task per connection in
//! the [`ConnectionRegistry`], finds other nodes over multicast and closes
//! connections that go quiet. Everything hangs off one shutdown signal.

pub mod discovery;
pub mod error;
pub mod lifecycle;
mod listener;
pub mod peer;
pub mod reaper;
pub mod registry;
pub mod session;

pub use discovery::{DiscoveredPeer, DiscoveryOptions};
pub use error::{Error, Result};
pub use peer::{BroadcastReport, Peer, PeerInfo, PeerOptions};
pub use registry::{ConnectionEntry, ConnectionId, ConnectionRegistry, Direction};
