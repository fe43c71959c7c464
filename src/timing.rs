//! One-shot time-based producers.
//!
//! Both producers register a single timer on the handle's scheduler and
//! settle when it fires. The delay is a lower bound: the handle settles on the
//! first turn of the loop at which at least `delay` has passed.

use std::time::Duration;

use crate::{Deferred, SchedulerHandle};

/// Returns a handle that fulfills with `value` once `delay` has passed.
///
/// # Example
/// ```
/// # use settle::{Error, Scheduler, State, clock::ManualClock, timing::after_delay};
/// # use std::time::Duration;
/// let clock = ManualClock::new();
/// let scheduler = Scheduler::with_clock(clock.clone());
///
/// let handle = scheduler.handle();
///
/// let done = after_delay::<_, Error>(&handle, Duration::from_millis(1500), "Timeout!");
/// assert_eq!(scheduler.run_until_settled(&done), State::Fulfilled("Timeout!"));
/// assert_eq!(clock.elapsed(), Duration::from_millis(1500));
/// ```
pub fn after_delay<T, E>(handle: &SchedulerHandle, delay: Duration, value: T) -> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    Deferred::new(handle, |settle| {
        handle.set_timeout(delay, move || {
            settle.fulfill(value);
        });
        Ok(())
    })
}

/// Returns a handle that rejects with `reason` once `delay` has passed.
pub fn reject_after<T, E>(handle: &SchedulerHandle, delay: Duration, reason: E) -> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    Deferred::new(handle, |settle| {
        handle.set_timeout(delay, move || {
            settle.reject(reason);
        });
        Ok(())
    })
}
