/// Cooldown calculator for a suspended periodic unit.
///
/// Tracks the current delay and the number of consecutive faults. The
/// delay is multiplied after each fault, capped at `max_delay`. With a
/// multiplier of 1 (and `initial == max`) this is a fixed cooldown.
/// Calling `reset()` returns the delay to `initial_delay` (used after a
/// healthy tick or an operator re-arm).
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
    current_delay: Duration,
    /// Number of consecutive faults (resets on `reset()`).
    pub attempt: u32,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: u32) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier: multiplier.max(1),
            current_delay: initial_delay,
            attempt: 0,
        }
    }

    /// Same delay after every fault.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1)
    }

    /// Returns the current delay and advances the state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.attempt += 1;
        self.current_delay = self
            .current_delay
            .saturating_mul(self.multiplier)
            .min(self.max_delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_never_grows() {
        let mut b = Backoff::fixed(Duration::from_secs(60));
        for _ in 0..5 {
            assert_eq!(b.next_delay(), Duration::from_secs(60));
        }
        assert_eq!(b.attempt, 5);
    }

    #[test]
    fn test_exponential_growth_with_cap() {
        let mut b = Backoff::new(Duration::from_secs(60), Duration::from_secs(300), 2);
        assert_eq!(b.next_delay(), Duration::from_secs(60));
        assert_eq!(b.next_delay(), Duration::from_secs(120));
        assert_eq!(b.next_delay(), Duration::from_secs(240));
        // 240 * 2 = 480, capped at 300
        assert_eq!(b.next_delay(), Duration::from_secs(300));
        assert_eq!(b.next_delay(), Duration::from_secs(300));
    }

    #[test]
    fn test_reset() {
        let mut b = Backoff::new(Duration::from_secs(2), Duration::from_secs(60), 2);
        b.next_delay(); // 2
        b.next_delay(); // 4
        assert_eq!(b.current_delay, Duration::from_secs(8));
        assert_eq!(b.attempt, 2);

        b.reset();
        assert_eq!(b.attempt, 0);
        assert_eq!(b.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_degenerate_inputs_clamped() {
        // multiplier 0 and max below initial behave like a fixed cooldown
        let mut b = Backoff::new(Duration::from_secs(10), Duration::from_secs(1), 0);
        assert_eq!(b.next_delay(), Duration::from_secs(10));
        assert_eq!(b.next_delay(), Duration::from_secs(10));
    }
}
