use std::time::Duration;

/// Exponential reconnect schedule.
///
/// `delay = min(initial * 2^attempt, max)`. Crossing `max_failures` marks the
/// connection degraded but never stops the schedule; it holds at `max`.
#[derive(Clone, Debug)]
pub struct ReconnectState {
    initial_delay: Duration,
    max_delay: Duration,
    max_failures: u32,
    attempt_count: u32,
    current_delay: Duration,
}

impl ReconnectState {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_failures: u32) -> Self {
        // initial > max is rejected by config validation; clamp anyway so the
        // bound initial <= current <= max holds for hand-built values
        let initial_delay = initial_delay.min(max_delay);
        Self {
            initial_delay,
            max_delay,
            max_failures,
            attempt_count: 0,
            current_delay: initial_delay,
        }
    }

    /// Record one failed attempt and return how long to wait before the next.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt_count).unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        self.attempt_count = self.attempt_count.saturating_add(1);
        self.current_delay = delay;
        delay
    }

    /// Back to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.current_delay = self.initial_delay;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// True once `max_failures` consecutive attempts have failed.
    pub fn is_degraded(&self) -> bool {
        self.max_failures > 0 && self.attempt_count >= self.max_failures
    }
}
