use std::cmp;
use std::time::Duration;

/// Reconnect delay that doubles on every consecutive failure.
///
/// `next_delay` returns the delay to wait now and advances the schedule;
/// `reset` returns to the initial delay after a successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = cmp::min(initial, max);
        Backoff {
            initial,
            max,
            current: initial,
            failures: 0,
        }
    }

    /// Delay the next failure will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = cmp::min(self.current.saturating_mul(2), self.max);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(ms(100), ms(1000));
        let delays: Vec<_> = (0..7).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![ms(100), ms(200), ms(400), ms(800), ms(1000), ms(1000), ms(1000)]
        );
        assert_eq!(backoff.failures(), 7);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = Backoff::new(ms(50), ms(400));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), ms(200));
        backoff.reset();
        assert_eq!(backoff.current(), ms(50));
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_delay(), ms(50));
    }

    #[test]
    fn never_exceeds_max_even_with_odd_bounds() {
        let mut backoff = Backoff::new(ms(300), ms(1000));
        for _ in 0..64 {
            assert!(backoff.next_delay() <= ms(1000));
        }
        let mut inverted = Backoff::new(ms(500), ms(100));
        assert_eq!(inverted.next_delay(), ms(100));
    }
}
