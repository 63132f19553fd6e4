//! Global spacing for conversion requests

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Single-slot timed gate shared by every worker.
///
/// Each [`RateGate::acquire`] returns no earlier than `interval` after the
/// previous one returned. Waiters queue on the mutex, so the spacing holds
/// regardless of how many workers call in.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Wait for the slot, then claim it
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready = previous + self.interval;
            if ready > Instant::now() {
                trace!(wait = ?(ready - Instant::now()), "Rate gate closed");
                sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}
