use std::time::Duration;

/// Delay before the first reconnect.
pub const BASE_DELAY: Duration = Duration::from_millis(1000);

/// Longest delay between reconnects.
pub const MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Doubling stops here; `BASE_DELAY * 2^5` is already past the cap.
const MAX_EXPONENT: u32 = 5;

/// Exponential back-off for reconnects: 1s, 2s, 4s, 8s, 16s, then 30s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconnects scheduled since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for the given attempt number, starting at 0.
    pub fn delay_for(attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        (BASE_DELAY * factor).min(MAX_DELAY)
    }

    /// Schedule one more reconnect and return how long to wait for it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Self::delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_doubles_then_caps() {
        let mut policy = ReconnectPolicy::new();
        let delays: Vec<u64> = (0..8).map(|_| policy.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(policy.attempt(), 8);
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut policy = ReconnectPolicy::new();
        policy.next_delay();
        policy.next_delay();
        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), BASE_DELAY);
    }

    #[test]
    fn huge_attempt_counts_stay_capped() {
        assert_eq!(ReconnectPolicy::delay_for(u32::MAX), MAX_DELAY);
    }
}
