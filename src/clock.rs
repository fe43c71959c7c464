//! Time sources for the [`Scheduler`](crate::Scheduler).
//!
//! The scheduler never reads the system time directly. It asks its `Clock`,
//! so the same timers can run against wall time or against a simulated clock
//! that tests move forward explicitly.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// A source of the current time for timer bookkeeping.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Returns `true` if this clock is simulated.
    ///
    /// A simulated clock is never waited on. When nothing is runnable the
    /// scheduler calls [`advance_to`](Clock::advance_to) to jump straight to
    /// the next due timer.
    fn is_virtual(&self) -> bool {
        false
    }

    /// Moves a simulated clock forward to `deadline`. Real clocks ignore this.
    fn advance_to(&self, _deadline: Instant) {}
}

/// Wall-clock time backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A simulated clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one clone and hand the other
/// to [`Scheduler::with_clock`](crate::Scheduler::with_clock).
///
/// # Example
/// ```
/// # use settle::clock::{Clock, ManualClock};
/// # use std::time::Duration;
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(10));
/// assert_eq!(clock.now() - start, Duration::from_millis(10));
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Moves the clock forward by `by`.
    ///
    /// Stops at the furthest instant the platform can represent.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset = self.clamp(offset.saturating_add(by));
    }

    // Largest offset not past `target` that still fits in an `Instant`.
    fn clamp(&self, target: Duration) -> Duration {
        if self.origin.checked_add(target).is_some() {
            return target;
        }
        let (mut fits, mut overflows) = (Duration::ZERO, target);
        while overflows - fits > Duration::from_nanos(1) {
            let mid = fits + (overflows - fits) / 2;
            if self.origin.checked_add(mid).is_some() {
                fits = mid;
            } else {
                overflows = mid;
            }
        }
        fits
    }

    /// Time passed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn is_virtual(&self) -> bool {
        true
    }

    fn advance_to(&self, deadline: Instant) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        let target = deadline.saturating_duration_since(self.origin);
        // Never run backwards.
        if target > *offset {
            *offset = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_forward() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.advance_to(start + Duration::from_millis(30));
        clock.advance_to(start + Duration::from_millis(10));

        assert_eq!(clock.elapsed(), Duration::from_millis(30));
        assert!(clock.is_virtual());
    }

    #[test]
    fn advance_saturates_instead_of_overflowing() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.advance(Duration::from_millis(5));
        clock.advance(Duration::MAX);
        let furthest = clock.now();
        clock.advance(Duration::from_millis(5));

        assert!(furthest > start + Duration::from_millis(5));
        assert_eq!(
            clock.now(),
            furthest,
            "Clock should stay at its furthest instant"
        );
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        other.advance(Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }
}
