//! Retry scheduler
//!
//! Decides, on each connection failure, whether another attempt should be
//! made and after how long, and enforces a timeout on attempts that never
//! settle. The scheduler never sleeps: it arms [`Tick`]s on a [`Timer`] and
//! interprets them when the event loop hands them back through
//! [`RetryScheduler::on_tick`].
//!
//! ```text
//!            attempt()              retry() ─ Scheduled ─┐
//!   Idle ───────────────> Attempting <───────────────────┘
//!    ▲  reset()               │   │
//!    └────────────────────────┤   └─ retry() ─ budget exhausted ─> Abandoned
//!                             └─ stop() ─> Stopped
//! ```
//!
//! Every `reset()`/`stop()` bumps the scheduler epoch, so ticks armed before
//! are recognised as stale even if the timer delivers them anyway.

use crate::traits::*;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of one retry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// No attempt outstanding
    Idle,
    /// An attempt is connecting, or a retry is waiting on its backoff
    Attempting,
    /// An attempt succeeded; `retry()` is ignored until `reset()`
    Stopped,
    /// Retry budget exhausted; terminal until `reset()`
    Abandoned,
}

/// Outcome of [`RetryScheduler::retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempt number `attempt` will start after `delay`
    Scheduled { attempt: u32, delay: Duration },
    /// No more attempts will be made
    Abandoned,
    /// The scheduler was stopped, abandoned, or never started; nothing happens
    Ignored,
}

impl RetryDecision {
    /// True if another attempt was scheduled
    pub fn will_retry(&self) -> bool {
        matches!(self, RetryDecision::Scheduled { .. })
    }
}

/// What the event loop must do for a tick that is still current
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Open the socket for this attempt now
    Connect(u32),
    /// This attempt neither opened nor closed in time; force it to fail
    TimedOut(u32),
}

/// Exponential/fixed backoff driver for one connection
pub struct RetryScheduler {
    strategy: Box<dyn ReconnectionStrategy>,
    timer: Box<dyn Timer>,
    state: SchedulerState,
    attempts: u32,
    epoch: u64,
    attempt_timeout: Option<Duration>,
    primed: bool,
}

impl RetryScheduler {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>, timer: Box<dyn Timer>) -> Self {
        Self {
            strategy,
            timer,
            state: SchedulerState::Idle,
            attempts: 0,
            epoch: 0,
            attempt_timeout: None,
            primed: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Attempts made in the current cycle
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Clear the attempt count, go back to idle and cancel pending ticks
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.state = SchedulerState::Idle;
        self.attempts = 0;
        self.strategy.reset();
    }

    /// Start a cycle with its first attempt
    ///
    /// Returns the attempt number (always 1). The caller connects
    /// immediately; if the attempt is not stopped or failed within
    /// `timeout`, a [`TickAction::TimedOut`] is produced.
    pub fn attempt(&mut self, timeout: Duration) -> u32 {
        if self.state != SchedulerState::Idle {
            debug!(state = ?self.state, "attempt() on a busy scheduler, resetting first");
            self.reset();
        }

        self.state = SchedulerState::Attempting;
        self.attempts = 1;
        self.primed = true;
        self.attempt_timeout = (!timeout.is_zero()).then_some(timeout);
        self.arm_timeout();
        self.attempts
    }

    /// The current attempt definitively failed; decide what happens next
    ///
    /// Retrying from `Idle` after a successful connection starts a new
    /// cycle, counting that connection as its first attempt.
    pub fn retry(&mut self, reason: &str) -> RetryDecision {
        match self.state {
            SchedulerState::Stopped | SchedulerState::Abandoned => {
                debug!(state = ?self.state, reason, "retry() ignored");
                return RetryDecision::Ignored;
            }
            SchedulerState::Idle if !self.primed => {
                debug!(reason, "retry() before any attempt ignored");
                return RetryDecision::Ignored;
            }
            SchedulerState::Idle | SchedulerState::Attempting => {}
        }

        let failed = self.attempts.max(1);
        let retry = (failed - 1) as usize;

        match self.strategy.next_delay(retry) {
            Some(delay) => {
                self.state = SchedulerState::Attempting;
                self.attempts = failed.saturating_add(1);
                info!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    failed, reason, delay
                );
                self.timer.schedule(
                    delay,
                    Tick {
                        epoch: self.epoch,
                        attempt: self.attempts,
                        kind: TickKind::Backoff,
                    },
                );
                RetryDecision::Scheduled {
                    attempt: self.attempts,
                    delay,
                }
            }
            None => {
                warn!(
                    "Giving up after {} attempts, last failure: {}",
                    failed, reason
                );
                self.cancel_pending();
                self.state = SchedulerState::Abandoned;
                RetryDecision::Abandoned
            }
        }
    }

    /// The cycle concluded successfully; cancel pending ticks
    pub fn stop(&mut self) {
        self.cancel_pending();
        self.state = SchedulerState::Stopped;
    }

    /// Interpret a fired tick; stale ticks yield `None`
    pub fn on_tick(&mut self, tick: Tick) -> Option<TickAction> {
        if tick.epoch != self.epoch
            || tick.attempt != self.attempts
            || self.state != SchedulerState::Attempting
        {
            debug!(?tick, epoch = self.epoch, attempts = self.attempts, "Stale tick dropped");
            return None;
        }

        match tick.kind {
            TickKind::Backoff => {
                self.arm_timeout();
                Some(TickAction::Connect(self.attempts))
            }
            TickKind::Timeout => Some(TickAction::TimedOut(self.attempts)),
        }
    }

    fn arm_timeout(&mut self) {
        if let Some(timeout) = self.attempt_timeout {
            self.timer.schedule(
                timeout,
                Tick {
                    epoch: self.epoch,
                    attempt: self.attempts,
                    kind: TickKind::Timeout,
                },
            );
        }
    }

    fn cancel_pending(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.timer.cancel_all();
    }
}
