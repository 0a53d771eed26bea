use std::time::Duration;

/// Which deferred callback a tick belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickKind {
    /// Backoff delay elapsed, the next attempt may start
    Backoff,
    /// The attempt did not settle within its timeout
    Timeout,
}

/// A fired timer, routed back to the scheduler that armed it
///
/// `epoch` and `attempt` let the scheduler recognise ticks armed before a
/// `reset()`/`stop()` or for an earlier attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tick {
    pub epoch: u64,
    pub attempt: u32,
    pub kind: TickKind,
}

/// Deferred-callback driver used by the retry scheduler
///
/// Implementations deliver each scheduled [`Tick`] back to the connection
/// manager's event loop once `delay` elapsed. Cancelled ticks must not be
/// delivered, but the scheduler still checks every tick it receives, so a
/// tick that races its cancellation is harmless.
pub trait Timer: Send {
    /// Arm a tick to fire after `delay`
    fn schedule(&mut self, delay: Duration, tick: Tick);

    /// Cancel every pending tick
    fn cancel_all(&mut self);
}
