//! Time source used by the acknowledgement polling loops.
//!
//! Transfers measure their ACK budgets against a [`Clock`] so that tests can
//! run a 3-second timeout without sleeping.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Manually advanced clock. `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Cell<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    /// Move the clock forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
    }

    /// Total time elapsed on this clock.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(100));
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(350));
        assert_eq!(clock.elapsed(), Duration::from_millis(350));
    }
}
