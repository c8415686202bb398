//! Idle reaper: closes connections that have been silent too long.
//!
//! Purely time based: no keepalive is sent before eviction.

use std::time::Duration;

use crate::lifecycle::{self, Shutdown};
use crate::registry::ConnectionRegistry;

pub(crate) async fn reaper_loop(
    registry: ConnectionRegistry,
    idle_timeout: Duration,
    every: Duration,
    mut shutdown: Shutdown,
) {
    let mut interval = lifecycle::ticker(every);

    tracing::info!(
        idle_timeout_secs = idle_timeout.as_secs(),
        interval_ms = interval.period().as_millis() as u64,
        "idle reaper starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("idle reaper shutting down");
                return;
            }

            _ = interval.tick() => {
                reap_idle(&registry, idle_timeout);
            }
        }
    }
}

/// Close every connection idle for at least `idle_timeout`. Returns the
/// number closed.
pub fn reap_idle(registry: &ConnectionRegistry, idle_timeout: Duration) -> usize {
    let mut closed = 0;
    for (id, address) in registry.find_idle(idle_timeout) {
        tracing::info!(id = %id, peer = %address, "closing idle connection");
        if registry.remove(id) {
            closed += 1;
        }
    }
    closed
}
