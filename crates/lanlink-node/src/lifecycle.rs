//! Shutdown signalling and task bookkeeping shared by every background loop.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Interval, MissedTickBehavior};

/// Shortest period a background loop ticks at.
pub const MIN_TICK: Duration = Duration::from_millis(10);

/// Interval for a periodic loop. Periods below [`MIN_TICK`], zero included,
/// are raised to it. Missed ticks are delayed, not bunched.
pub fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period.max(MIN_TICK));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Flips the shutdown flag for every subscriber.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cooperative shutdown flag observed by background loops.
///
/// Backed by a watch channel so a subscriber created after the trigger
/// still sees it.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered, or the trigger is dropped.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Short-lived tasks (sessions, discovery dials) that `stop` must join.
#[derive(Default)]
pub struct TaskSet {
    set: Mutex<JoinSet<()>>,
}

impl TaskSet {
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        // reap finished tasks so the set only holds live ones
        while set.try_join_next().is_some() {}
        set.spawn(fut);
    }

    pub fn len(&self) -> usize {
        self.set.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait for every task spawned so far.
    pub async fn join_all(&self) {
        let mut set = std::mem::take(&mut *self.set.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    tracing::error!(error = %e, "task panicked");
                }
            }
        }
    }
}
