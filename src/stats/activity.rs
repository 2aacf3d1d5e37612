//! Rolling per-second query volume over the last minute.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Number of one-second slots kept by the ring.
pub const ACTIVITY_SLOTS: usize = 60;

#[derive(Debug)]
struct Ring {
    slots: [u64; ACTIVITY_SLOTS],
    cursor: usize,
}

/// Fixed-size circular counter of queries per second.
///
/// [`record`](Self::record) bumps the current slot; [`tick`](Self::tick)
/// moves the cursor forward and clears the slot it lands on.
#[derive(Debug)]
pub struct ActivityRing {
    ring: RwLock<Ring>,
}

impl Default for ActivityRing {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityRing {
    pub fn new() -> Self {
        Self {
            ring: RwLock::new(Ring {
                slots: [0; ACTIVITY_SLOTS],
                cursor: 0,
            }),
        }
    }

    /// Count one query in the current second.
    pub fn record(&self) {
        let mut ring = self.ring.write();
        let cursor = ring.cursor;
        ring.slots[cursor] += 1;
    }

    /// Advance to the next second.
    pub fn tick(&self) {
        let mut ring = self.ring.write();
        ring.cursor = (ring.cursor + 1) % ACTIVITY_SLOTS;
        let cursor = ring.cursor;
        ring.slots[cursor] = 0;
    }

    /// The last 60 seconds, oldest first. The current second is last.
    pub fn snapshot(&self) -> Vec<u64> {
        let ring = self.ring.read();
        (1..=ACTIVITY_SLOTS)
            .map(|offset| ring.slots[(ring.cursor + offset) % ACTIVITY_SLOTS])
            .collect()
    }
}

/// Tick the ring once per `period` until `shutdown` fires.
pub fn spawn_ticker(
    ring: Arc<ActivityRing>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => ring.tick(),
                _ = shutdown.changed() => break,
            }
        }
    })
}
