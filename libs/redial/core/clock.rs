//! Timer implementations
//!
//! - [`TokioTimer`]: production timer. Each tick is a tokio task sleeping
//!   for the delay, then posting `Input::Tick` to the manager's event loop.
//! - [`ManualTimer`]: fake clock for tests. Ticks fire only when the test
//!   calls [`ManualTimer::advance`].

use crate::core::connection::Input;
use crate::traits::{Tick, Timer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Timer backed by `tokio::time::sleep`
pub struct TokioTimer {
    inputs: mpsc::UnboundedSender<Input>,
    pending: Vec<JoinHandle<()>>,
}

impl TokioTimer {
    pub fn new(inputs: mpsc::UnboundedSender<Input>) -> Self {
        Self {
            inputs,
            pending: Vec::new(),
        }
    }
}

impl Timer for TokioTimer {
    fn schedule(&mut self, delay: Duration, tick: Tick) {
        self.pending.retain(|handle| !handle.is_finished());

        let inputs = self.inputs.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(?tick, "Timer fired");
            let _ = inputs.send(Input::Tick(tick));
        });
        self.pending.push(handle);
    }

    fn cancel_all(&mut self) {
        for handle in self.pending.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[derive(Debug, Default)]
struct ManualClock {
    now: Duration,
    queue: Vec<(Duration, Tick)>,
}

/// Fake clock; clones share the same queue
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the fake clock
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Pending ticks as `(delay from now, tick)`, soonest first
    pub fn pending(&self) -> Vec<(Duration, Tick)> {
        let clock = self.clock.lock();
        let mut pending: Vec<_> = clock
            .queue
            .iter()
            .map(|(deadline, tick)| (deadline.saturating_sub(clock.now), *tick))
            .collect();
        pending.sort_by_key(|(delay, _)| *delay);
        pending
    }

    /// Move the clock forward; returns the ticks that came due, in order
    pub fn advance(&self, by: Duration) -> Vec<Tick> {
        let mut clock = self.clock.lock();
        clock.now += by;
        let now = clock.now;

        let mut due: Vec<(Duration, Tick)> = Vec::new();
        clock.queue.retain(|entry| {
            if entry.0 <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, tick)| tick).collect()
    }

    /// Jump straight to the next pending tick
    pub fn fire_next(&self) -> Option<Tick> {
        let delay = self.pending().first().map(|(delay, _)| *delay)?;
        self.advance(delay).into_iter().next()
    }
}

impl Timer for ManualTimer {
    fn schedule(&mut self, delay: Duration, tick: Tick) {
        let mut clock = self.clock.lock();
        let deadline = clock.now + delay;
        clock.queue.push((deadline, tick));
    }

    fn cancel_all(&mut self) {
        self.clock.lock().queue.clear();
    }
}
