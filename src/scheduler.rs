//! Provides the `Scheduler`, a single-threaded cooperative event loop.
//!
//! Every reaction of a [`Deferred`] and every timer callback runs as a job on
//! the thread that drives the scheduler, one at a time, so callbacks never
//! race with each other and never need locks of their own. Other threads only
//! hand work over through a [`SchedulerHandle`].
//!
//! A turn of the loop runs all queued jobs first (in FIFO order), then the
//! earliest due timer, and repeats. Timers with the same due instant fire in
//! the order they were registered. When nothing is runnable the loop either
//! sleeps until the next timer, jumps a simulated [`Clock`] forward, or waits
//! for outstanding [`ExternalWork`] to post its completion.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    fmt,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{
    Deferred,
    clock::{Clock, SystemClock},
    deferred::State,
};

type Job = Box<dyn FnOnce() + Send>;
type TimerCallback = Box<dyn FnMut() + Send>;

// Intervals shorter than this would never let a simulated clock move.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identifies a timer registered with [`SchedulerHandle::set_timeout`] or
/// [`SchedulerHandle::set_interval`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

struct TimerEntry {
    // `None` when the due instant is too far out to represent.
    due: Option<Instant>,
    period: Option<Duration>,
    // Taken out while the callback runs.
    callback: Option<TimerCallback>,
}

#[derive(Default)]
struct Timers {
    next_id: u64,
    entries: HashMap<TimerId, TimerEntry>,
    queue: BTreeSet<(Instant, TimerId)>,
}

impl Timers {
    fn insert(
        &mut self,
        due: Option<Instant>,
        period: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            TimerEntry {
                due,
                period,
                callback: Some(callback),
            },
        );
        if let Some(due) = due {
            self.queue.insert((due, id));
        }
        id
    }

    fn remove(&mut self, id: TimerId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        if let Some(due) = entry.due {
            self.queue.remove(&(due, id));
        }
        true
    }

    fn next_due(&self) -> Option<Instant> {
        self.queue.first().map(|&(due, _)| due)
    }
}

struct Shared {
    clock: Arc<dyn Clock>,
    jobs: Mutex<VecDeque<Job>>,
    job_ready: Condvar,
    timers: Mutex<Timers>,
    external: AtomicUsize,
    timer_fires: AtomicU64,
}

/// A cloneable, thread-safe handle to a [`Scheduler`].
///
/// Producers and combinators use it to queue jobs and register timers. It can
/// be sent to other threads, which is how transports hand their completions
/// back to the loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Queues `job` to run on a later turn of the loop.
    ///
    /// Jobs run in the order they were queued, before any timer that is due
    /// at the same moment.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        let mut jobs = lock(&self.shared.jobs);
        jobs.push_back(Box::new(job));
        self.shared.job_ready.notify_one();
    }

    /// Runs `callback` once, after at least `delay` has passed.
    ///
    /// A delay too large for the clock to represent never fires, but the
    /// timer stays registered until cleared.
    pub fn set_timeout(
        &self,
        delay: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerId {
        let mut callback = Some(callback);
        self.insert_timer(
            delay,
            None,
            Box::new(move || {
                if let Some(callback) = callback.take() {
                    callback();
                }
            }),
        )
    }

    /// Runs `callback` every `period` until the timer is cleared.
    ///
    /// A timer that is never cleared keeps the scheduler busy forever.
    pub fn set_interval(
        &self,
        period: Duration,
        callback: impl FnMut() + Send + 'static,
    ) -> TimerId {
        let period = period.max(MIN_INTERVAL);
        self.insert_timer(period, Some(period), Box::new(callback))
    }

    /// Removes a timer. Returns `false` if it already fired (one-shot) or was
    /// cleared before.
    ///
    /// Clearing an interval from inside its own callback stops it after the
    /// current run.
    pub fn clear_timer(&self, id: TimerId) -> bool {
        let removed = lock(&self.shared.timers).remove(id);
        if removed {
            debug!(timer = ?id, "timer cleared");
        }
        removed
    }

    /// The current time of the scheduler's clock.
    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    /// Total number of timer callbacks executed so far.
    pub fn timer_fires(&self) -> u64 {
        self.shared.timer_fires.load(Ordering::Relaxed)
    }

    /// Number of timers that are registered and not yet cleared or finished.
    pub fn active_timers(&self) -> usize {
        lock(&self.shared.timers).entries.len()
    }

    /// Marks the start of work that completes outside of the loop.
    ///
    /// While the returned guard is alive the scheduler will not consider
    /// itself idle, it waits for a job to arrive instead. Drop the guard after
    /// (or inside) the job that delivers the completion.
    #[must_use = "the work is considered finished as soon as the guard is dropped"]
    pub fn external_work(&self) -> ExternalWork {
        self.shared.external.fetch_add(1, Ordering::SeqCst);
        ExternalWork {
            shared: Arc::clone(&self.shared),
        }
    }

    fn insert_timer(
        &self,
        delay: Duration,
        period: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerId {
        let due = self.now().checked_add(delay);
        let id = lock(&self.shared.timers).insert(due, period, callback);
        if due.is_none() {
            warn!(timer = ?id, ?delay, "timer delay out of range, it will never fire");
        }
        debug!(timer = ?id, ?delay, repeating = period.is_some(), "timer registered");
        id
    }

    fn pop_job(&self) -> Option<Job> {
        lock(&self.shared.jobs).pop_front()
    }

    fn next_due(&self) -> Option<Instant> {
        lock(&self.shared.timers).next_due()
    }

    fn has_external_work(&self) -> bool {
        self.shared.external.load(Ordering::SeqCst) > 0
    }

    // Runs the earliest timer if it is due at `now`.
    fn fire_due_timer(&self, now: Instant) -> bool {
        let (id, mut callback) = {
            let mut timers = lock(&self.shared.timers);
            let Some(&(due, id)) = timers.queue.first() else {
                return false;
            };
            if due > now {
                return false;
            }
            timers.queue.pop_first();
            let callback = timers
                .entries
                .get_mut(&id)
                .and_then(|entry| entry.callback.take());
            let Some(callback) = callback else {
                return true;
            };
            (id, callback)
        };

        let fired = self.shared.timer_fires.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(timer = ?id, fired, "timer fired");
        callback();

        let mut timers = lock(&self.shared.timers);
        let timers = &mut *timers;
        // Gone if the callback cleared its own timer.
        let Some(entry) = timers.entries.get_mut(&id) else {
            return true;
        };
        if let Some(period) = entry.period {
            entry.due = now.checked_add(period);
            entry.callback = Some(callback);
            if let Some(due) = entry.due {
                timers.queue.insert((due, id));
            }
        } else {
            timers.entries.remove(&id);
        }
        true
    }

    // Blocks (or jumps virtual time) until something may have become runnable.
    fn park(&self, wake_at: Option<Instant>) {
        let shared = &self.shared;
        if shared.clock.is_virtual() && !self.has_external_work() {
            if let Some(at) = wake_at {
                shared.clock.advance_to(at);
            }
            return;
        }

        let jobs = lock(&shared.jobs);
        if !jobs.is_empty() {
            return;
        }
        match wake_at {
            Some(at) if !shared.clock.is_virtual() => {
                let timeout = at.saturating_duration_since(shared.clock.now());
                trace!(?timeout, "parking until next timer");
                let _parked = shared
                    .job_ready
                    .wait_timeout(jobs, timeout)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            _ => {
                if !self.has_external_work() {
                    return;
                }
                trace!("parking until external work completes");
                let _parked = shared
                    .job_ready
                    .wait(jobs)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("active_timers", &self.active_timers())
            .field("timer_fires", &self.timer_fires())
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`SchedulerHandle::external_work`].
pub struct ExternalWork {
    shared: Arc<Shared>,
}

impl Drop for ExternalWork {
    fn drop(&mut self) {
        // Taken under the job lock so a parked loop cannot miss the change.
        let _jobs = lock(&self.shared.jobs);
        self.shared.external.fetch_sub(1, Ordering::SeqCst);
        self.shared.job_ready.notify_all();
    }
}

/// Drives jobs and timers on the calling thread.
///
/// Create one scheduler per logical thread of work, hand its
/// [`handle`](Scheduler::handle) to producers, then call one of the `run`
/// methods.
///
/// # Example
/// ```
/// # use settle::{Error, Scheduler, timing::after_delay};
/// # use std::time::Duration;
/// let scheduler = Scheduler::new();
/// let handle = scheduler.handle();
///
/// let greeting = after_delay::<_, Error>(&handle, Duration::from_millis(5), "hello");
/// let state = scheduler.run_until_settled(&greeting);
/// assert!(state.is_fulfilled());
/// ```
pub struct Scheduler {
    handle: SchedulerHandle,
}

impl Scheduler {
    /// Creates a scheduler that follows wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Creates a scheduler on top of the given clock.
    ///
    /// Pass a [`ManualClock`](crate::clock::ManualClock) to run timers in
    /// simulated time.
    #[must_use]
    pub fn with_clock(clock: impl Clock) -> Self {
        Self {
            handle: SchedulerHandle {
                shared: Arc::new(Shared {
                    clock: Arc::new(clock),
                    jobs: Mutex::new(VecDeque::with_capacity(16)),
                    job_ready: Condvar::new(),
                    timers: Mutex::new(Timers::default()),
                    external: AtomicUsize::new(0),
                    timer_fires: AtomicU64::new(0),
                }),
            },
        }
    }

    /// Returns a handle for queuing jobs and timers on this scheduler.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Runs until there are no jobs, no timers that can still fire and no
    /// outstanding external work left.
    ///
    /// An interval that is never cleared keeps this from returning.
    pub fn run(&self) {
        self.drive(None, || false);
    }

    /// Runs until the clock passes `now + duration`, firing every timer due
    /// up to and including that instant.
    ///
    /// A simulated clock ends up exactly at the deadline. A real clock returns
    /// early if the loop goes idle. A duration too large for the clock to
    /// represent behaves like [`run`](Scheduler::run).
    pub fn run_for(&self, duration: Duration) {
        let deadline = self.handle.now().checked_add(duration);
        self.drive(deadline, || false);
    }

    /// Runs until `deferred` settles or the loop goes idle, and returns its
    /// state at that point.
    pub fn run_until_settled<T, E>(&self, deferred: &Deferred<T, E>) -> State<T, E>
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        self.drive(None, || deferred.is_settled());
        deferred.state()
    }

    fn drive(&self, deadline: Option<Instant>, done: impl Fn() -> bool) {
        let handle = &self.handle;
        loop {
            if done() {
                return;
            }
            if let Some(job) = handle.pop_job() {
                trace!("running job");
                job();
                continue;
            }
            let now = handle.now();
            if handle.fire_due_timer(now) {
                continue;
            }
            if deadline.is_some_and(|deadline| now >= deadline) {
                return;
            }

            let next_due = handle.next_due();
            if next_due.is_none() && !handle.has_external_work() {
                if let Some(deadline) = deadline {
                    handle.shared.clock.advance_to(deadline);
                }
                trace!("scheduler idle");
                return;
            }
            let wake_at = match (next_due, deadline) {
                (Some(due), Some(deadline)) => Some(due.min(deadline)),
                (due, deadline) => due.or(deadline),
            };
            handle.park(wake_at);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&log), log)
    }

    #[test]
    fn jobs_run_in_fifo_order() {
        let scheduler = Scheduler::with_clock(ManualClock::new());
        let handle = scheduler.handle();
        let (log, log_cl) = recorder();

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log_cl);
            handle.spawn(move || log.lock().unwrap().push(name));
        }
        scheduler.run();

        assert_eq!(*log.lock().unwrap(), ["first", "second", "third"]);
    }

    #[test]
    fn timers_fire_in_due_order_then_creation_order() {
        let clock = ManualClock::new();
        let scheduler = Scheduler::with_clock(clock.clone());
        let handle = scheduler.handle();
        let (log, log_cl) = recorder();

        let l = Arc::clone(&log_cl);
        handle.set_timeout(Duration::from_millis(30), move || {
            l.lock().unwrap().push("30ms")
        });
        let l = Arc::clone(&log_cl);
        handle.set_timeout(Duration::from_millis(10), move || {
            l.lock().unwrap().push("10ms-a")
        });
        let l = Arc::clone(&log_cl);
        handle.set_timeout(Duration::from_millis(10), move || {
            l.lock().unwrap().push("10ms-b")
        });

        scheduler.run();

        assert_eq!(*log.lock().unwrap(), ["10ms-a", "10ms-b", "30ms"]);
        assert_eq!(
            clock.elapsed(),
            Duration::from_millis(30),
            "Clock should stop at the last timer"
        );
        assert_eq!(handle.timer_fires(), 3);
        assert_eq!(
            handle.active_timers(),
            0,
            "One-shot timers should be released after firing"
        );
    }

    #[test]
    fn jobs_from_a_timer_run_before_the_next_timer() {
        let scheduler = Scheduler::with_clock(ManualClock::new());
        let handle = scheduler.handle();
        let (log, log_cl) = recorder();

        let l = Arc::clone(&log_cl);
        let h = handle.clone();
        handle.set_timeout(Duration::from_millis(5), move || {
            l.lock().unwrap().push("timer-1");
            let l = Arc::clone(&l);
            h.spawn(move || l.lock().unwrap().push("job"));
        });
        let l = Arc::clone(&log_cl);
        handle.set_timeout(Duration::from_millis(5), move || {
            l.lock().unwrap().push("timer-2")
        });

        scheduler.run();

        assert_eq!(*log.lock().unwrap(), ["timer-1", "job", "timer-2"]);
    }

    #[test]
    fn interval_stops_when_cleared_from_its_callback() {
        let scheduler = Scheduler::with_clock(ManualClock::new());
        let handle = scheduler.handle();
        let ticks = Arc::new(AtomicUsize::new(0));
        let id = Arc::new(Mutex::new(None::<TimerId>));

        let ticks_cl = Arc::clone(&ticks);
        let id_cl = Arc::clone(&id);
        let h = handle.clone();
        let timer = handle.set_interval(Duration::from_millis(10), move || {
            if ticks_cl.fetch_add(1, Ordering::Relaxed) + 1 == 3 {
                if let Some(id) = *id_cl.lock().unwrap() {
                    h.clear_timer(id);
                }
            }
        });
        *id.lock().unwrap() = Some(timer);

        scheduler.run();

        assert_eq!(
            ticks.load(Ordering::Relaxed),
            3,
            "Interval should run until cleared"
        );
        assert_eq!(handle.active_timers(), 0);
        assert!(
            !handle.clear_timer(timer),
            "Clearing twice should report nothing removed"
        );
    }

    #[test]
    fn run_for_moves_virtual_time_to_the_deadline() {
        let clock = ManualClock::new();
        let scheduler = Scheduler::with_clock(clock.clone());
        let handle = scheduler.handle();

        handle.set_interval(Duration::from_millis(10), || {});
        scheduler.run_for(Duration::from_millis(55));

        assert_eq!(handle.timer_fires(), 5);
        assert_eq!(clock.elapsed(), Duration::from_millis(55));
        assert_eq!(
            handle.active_timers(),
            1,
            "Interval should still be registered"
        );
    }

    #[test]
    fn external_work_keeps_the_loop_alive() {
        let scheduler = Scheduler::new();
        let handle = scheduler.handle();
        let (log, log_cl) = recorder();

        let work = handle.external_work();
        let h = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            h.spawn(move || {
                log_cl.lock().unwrap().push("completed");
                drop(work);
            });
        });
        scheduler.run();

        assert_eq!(
            *log.lock().unwrap(),
            ["completed"],
            "Loop should wait for the completion"
        );
    }
}
