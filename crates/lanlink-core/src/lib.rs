//! lanlink-core: addressing, wire format, framing and configuration.
//! All other lanlink crates depend on this one.

pub mod addr;
pub mod config;
pub mod framing;
pub mod wire;

pub use addr::{should_initiate, PeerAddress};
pub use framing::Framing;
