//! Repeating timer producers and their `Cancellation`.
//!
//! A recurring producer settles its handle on the first tick only, yet the
//! interval behind it keeps firing until someone releases it. Forgetting to do
//! so is a leak: nothing observable happens on later ticks, but the timer
//! stays registered and the scheduler never goes idle.
//!
//! [`on_recurring_tick`] hands the release to the caller.
//! [`on_recurring_tick_once`] releases the timer itself as soon as the handle
//! settles.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::debug;

use crate::{Deferred, SchedulerHandle, scheduler::TimerId};

/// Returns a handle fulfilled with `value` on the first tick, and the
/// [`Cancellation`] that stops the ticks.
///
/// The caller must call [`Cancellation::cancel`] (or attach
/// [`Cancellation::cancel_on_settle`]) once the handle has settled, otherwise
/// the interval fires forever.
pub fn on_recurring_tick<T, E>(
    handle: &SchedulerHandle,
    period: Duration,
    value: T,
) -> (Deferred<T, E>, Cancellation)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let (deferred, settle) = Deferred::pending(handle);
    let timer = handle.set_interval(period, move || {
        // Only the first tick settles, the rest are ignored.
        settle.fulfill(value.clone());
    });
    (deferred, Cancellation::new(handle.clone(), timer))
}

/// Like [`on_recurring_tick`], but the interval is released as soon as the
/// handle settles, before it can tick again.
pub fn on_recurring_tick_once<T, E>(
    handle: &SchedulerHandle,
    period: Duration,
    value: T,
) -> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let (deferred, cancellation) = on_recurring_tick(handle, period, value);
    cancellation.cancel_on_settle(&deferred)
}

/// Stops the interval of a recurring producer.
///
/// Clones control the same interval.
#[derive(Clone, Debug)]
pub struct Cancellation {
    handle: SchedulerHandle,
    timer: TimerId,
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    fn new(handle: SchedulerHandle, timer: TimerId) -> Self {
        Self {
            handle,
            timer,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stops all future ticks.
    ///
    /// Returns `true` on the call that actually released the timer. Cancelling
    /// again is a no-op that returns `false`.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.handle.clear_timer(self.timer);
        debug!(timer = ?self.timer, "recurring producer cancelled");
        true
    }

    /// Cancels once `deferred` settles and returns a handle with the same
    /// outcome.
    ///
    /// The release runs as a job queued by the settlement, and queued jobs
    /// always run before the next timer, so no further tick fires in between.
    pub fn cancel_on_settle<T, E>(&self, deferred: &Deferred<T, E>) -> Deferred<T, E>
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        let cancellation = self.clone();
        deferred.finally(move || {
            cancellation.cancel();
        })
    }

    /// Returns `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
