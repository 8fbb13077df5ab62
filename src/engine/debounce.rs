//! Pending-value debouncer driven by explicit instants

use std::time::Duration;
use tokio::time::Instant;

/// Holds the last settled value plus at most one pending value.
///
/// A pushed value becomes settled once `window` passes without another push.
/// Time is passed in by the caller, so the logic runs without timers.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    settled: T,
    pending: Option<(T, Instant)>,
}

impl<T: Clone> Debouncer<T> {
    pub fn new(initial: T, window: Duration) -> Self {
        Self {
            window,
            settled: initial,
            pending: None,
        }
    }

    /// Record a new value; restarts the settle window
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    /// Settle the pending value if its window has elapsed
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending.take() {
            Some((value, deadline)) if deadline <= now => {
                self.settled = value;
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn settled(&self) -> &T {
        &self.settled
    }

    /// Most recent value, settled or not
    pub fn latest(&self) -> &T {
        self.pending.as_ref().map(|(v, _)| v).unwrap_or(&self.settled)
    }
}
