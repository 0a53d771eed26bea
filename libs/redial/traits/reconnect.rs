use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// The [`RetryScheduler`](crate::core::scheduler::RetryScheduler) asks the
/// strategy for the delay before each retry of a failed connection.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `retry` - The retry number within the current cycle (0-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, retry: usize) -> Option<Duration>;

    /// Reset the strategy state (called when a retry cycle restarts)
    fn reset(&mut self);

    /// Check if we should continue reconnecting
    ///
    /// # Arguments
    /// * `retry` - The retry number within the current cycle (0-indexed)
    fn should_reconnect(&self, retry: usize) -> bool;
}

/// Exponential backoff reconnection strategy
///
/// Delays between reconnection attempts grow exponentially:
/// initial_delay * 2^retry, capped at max_delay. With `max_retries = None`
/// the strategy retries forever.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: Option<usize>,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `initial_delay` - The delay before the first retry
    /// * `max_delay` - The maximum delay between retries
    /// * `max_retries` - Maximum number of retries per cycle (None = forever)
    pub fn new(initial_delay: Duration, max_delay: Duration, max_retries: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            max_retries,
        }
    }

    /// Retry forever with the given delay bounds
    pub fn forever(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::new(initial_delay, max_delay, None)
    }

    pub fn max_retries(&self) -> Option<usize> {
        self.max_retries
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, retry: usize) -> Option<Duration> {
        if !self.should_reconnect(retry) {
            return None;
        }

        let factor = u32::try_from(retry)
            .ok()
            .and_then(|shift| 1u64.checked_shl(shift))
            .unwrap_or(u64::MAX);
        let initial_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        Some(Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms)))
    }

    fn reset(&mut self) {
        // No state to reset for exponential backoff
    }

    fn should_reconnect(&self, retry: usize) -> bool {
        self.max_retries.map_or(true, |max| retry < max)
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_retries: Option<usize>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    ///
    /// # Arguments
    /// * `delay` - The fixed delay between reconnects
    /// * `max_retries` - Maximum number of retries per cycle (None = forever)
    pub fn new(delay: Duration, max_retries: Option<usize>) -> Self {
        Self { delay, max_retries }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, retry: usize) -> Option<Duration> {
        if !self.should_reconnect(retry) {
            return None;
        }
        Some(self.delay)
    }

    fn reset(&mut self) {
        // No state to reset for fixed delay
    }

    fn should_reconnect(&self, retry: usize) -> bool {
        self.max_retries.map_or(true, |max| retry < max)
    }
}

/// Never reconnect strategy
///
/// Every retry request is answered with abandonment.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _retry: usize) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {
        // No state to reset
    }

    fn should_reconnect(&self, _retry: usize) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay_is_non_decreasing() {
        let strategy =
            ExponentialBackoff::forever(Duration::from_millis(250), Duration::from_secs(5));

        let mut previous = Duration::ZERO;
        for retry in 0..200 {
            let delay = strategy.next_delay(retry).unwrap();
            assert!(delay >= previous, "delay shrank at retry {}", retry);
            assert!(delay <= Duration::from_secs(5));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(5));
    }

    #[test]
    fn test_max_delay_never_below_initial() {
        let strategy = ExponentialBackoff::new(
            Duration::from_secs(3),
            Duration::from_secs(1),
            Some(2),
        );
        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(3)));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_secs(3)));
        assert_eq!(strategy.next_delay(2), None);
    }
}
