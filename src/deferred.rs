//! Defines `Deferred`, a handle to a result that is not known yet.
//!
//! A `Deferred` starts out pending and settles exactly once, either fulfilled
//! with a value or rejected with a reason. Whoever holds the matching
//! [`Settle`] decides when and how. Observers attached with
//! [`Deferred::on_settle`] (or one of its shorthands) always run as separate
//! jobs on the handle's [`Scheduler`](crate::Scheduler), in the order they were
//! attached, never inline with the call that settled the handle.
//!
//! Handles are cheap to clone, every clone observes the same result. A handle
//! is also a [`Future`], so it can be awaited from any executor while a
//! scheduler drives it elsewhere.

use std::{
    fmt,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

use tracing::trace;

use crate::{
    Error,
    scheduler::{SchedulerHandle, lock},
};

/// The lifecycle of a [`Deferred`]: `Pending`, then `Fulfilled` or `Rejected`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State<T, E> {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled(T),
    /// Settled with a rejection reason.
    Rejected(E),
}

impl<T, E> State<T, E> {
    /// Returns `true` if the handle has not settled.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns `true` once the handle is fulfilled or rejected.
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Returns `true` if fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Returns `true` if rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Converts a settled state into a `Result`, `None` while pending.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            Self::Pending => None,
            Self::Fulfilled(value) => Some(Ok(value)),
            Self::Rejected(reason) => Some(Err(reason)),
        }
    }

    fn settled(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.clone().into_result()
    }
}

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

struct Cell<T, E> {
    state: State<T, E>,
    reactions: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

/// A handle to a value that becomes available later.
///
/// See the [module documentation](self) for the settlement and ordering rules.
///
/// # Example
/// ```
/// # use settle::{Deferred, Error, Scheduler};
/// let scheduler = Scheduler::new();
/// let handle = scheduler.handle();
///
/// let answer = Deferred::<u32, Error>::new(&handle, |settle| {
///     settle.fulfill(41);
///     Ok(())
/// })
/// .then(|value| value + 1);
///
/// assert_eq!(scheduler.run_until_settled(&answer).into_result(), Some(Ok(42)));
/// ```
#[must_use = "a deferred result does nothing unless observed"]
pub struct Deferred<T, E = Error> {
    cell: Arc<Mutex<Cell<T, E>>>,
    handle: SchedulerHandle,
}

/// The capability to settle one [`Deferred`].
///
/// Only the first call to [`fulfill`](Settle::fulfill),
/// [`reject`](Settle::reject) or [`complete`](Settle::complete) has an effect,
/// later calls are ignored and return `false`. A `Settle` can be cloned and
/// moved to other threads. Dropping every clone without settling leaves the
/// handle pending forever.
pub struct Settle<T, E = Error> {
    cell: Arc<Mutex<Cell<T, E>>>,
    handle: SchedulerHandle,
}

impl<T, E> Settle<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Fulfills the handle with `value`.
    pub fn fulfill(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Rejects the handle with `reason`.
    pub fn reject(&self, reason: E) -> bool {
        self.complete(Err(reason))
    }

    /// Fulfills on `Ok`, rejects on `Err`.
    pub fn complete(&self, outcome: Result<T, E>) -> bool {
        let (reactions, wakers) = {
            let mut cell = lock(&self.cell);
            if cell.state.is_settled() {
                trace!("ignoring settle of an already settled handle");
                return false;
            }
            cell.state = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(reason) => State::Rejected(reason.clone()),
            };
            (
                std::mem::take(&mut cell.reactions),
                std::mem::take(&mut cell.wakers),
            )
        };
        trace!(
            fulfilled = outcome.is_ok(),
            observers = reactions.len(),
            "handle settled"
        );

        for reaction in reactions {
            let outcome = outcome.clone();
            self.handle.spawn(move || reaction(outcome));
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }
}

impl<T, E> Clone for Settle<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            handle: self.handle.clone(),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a handle and runs `producer` right away with its [`Settle`].
    ///
    /// The producer may settle synchronously, or keep the `Settle` and settle
    /// later from a timer, a job or another thread. If the producer returns
    /// `Err(reason)` the handle is rejected with that reason (unless the
    /// producer already settled it), the error is not returned to the caller.
    pub fn new<P>(handle: &SchedulerHandle, producer: P) -> Self
    where
        P: FnOnce(Settle<T, E>) -> Result<(), E>,
    {
        let (deferred, settle) = Self::pending(handle);
        if let Err(reason) = producer(settle.clone()) {
            trace!("producer failed synchronously");
            settle.reject(reason);
        }
        deferred
    }

    /// Creates a pending handle together with the capability to settle it.
    pub fn pending(handle: &SchedulerHandle) -> (Self, Settle<T, E>) {
        let cell = Arc::new(Mutex::new(Cell {
            state: State::Pending,
            reactions: Vec::new(),
            wakers: Vec::new(),
        }));
        let settle = Settle {
            cell: Arc::clone(&cell),
            handle: handle.clone(),
        };
        let deferred = Self {
            cell,
            handle: handle.clone(),
        };
        (deferred, settle)
    }

    /// Creates a handle that is already fulfilled.
    pub fn fulfilled(handle: &SchedulerHandle, value: T) -> Self {
        let (deferred, settle) = Self::pending(handle);
        settle.fulfill(value);
        deferred
    }

    /// Creates a handle that is already rejected.
    pub fn rejected(handle: &SchedulerHandle, reason: E) -> Self {
        let (deferred, settle) = Self::pending(handle);
        settle.reject(reason);
        deferred
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> State<T, E> {
        lock(&self.cell).state.clone()
    }

    /// Returns `true` once the handle is fulfilled or rejected.
    pub fn is_settled(&self) -> bool {
        lock(&self.cell).state.is_settled()
    }

    /// The scheduler this handle dispatches its observers on.
    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    /// Attaches a pair of observers and returns a handle for their result.
    ///
    /// Exactly one of the two runs, once the handle settles (or on the next
    /// turn of the scheduler if it already has). Whatever that observer
    /// returns settles the returned handle: `Ok` fulfills it, `Err` rejects
    /// it.
    pub fn on_settle<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Deferred<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
        R: FnOnce(E) -> Result<U, E> + Send + 'static,
    {
        let (chained, settle) = Deferred::pending(&self.handle);
        self.react(move |outcome| {
            let next = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            settle.complete(next);
        });
        chained
    }

    /// Maps the value, forwarding a rejection unchanged.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Deferred<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.on_settle(move |value| Ok(on_fulfilled(value)), Err)
    }

    /// Like [`then`](Deferred::then), but the observer may reject.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Deferred<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.on_settle(on_fulfilled, Err)
    }

    /// Recovers from a rejection, forwarding a value unchanged.
    pub fn catch<F>(&self, on_rejected: F) -> Deferred<T, E>
    where
        F: FnOnce(E) -> T + Send + 'static,
    {
        self.on_settle(Ok, move |reason| Ok(on_rejected(reason)))
    }

    /// Runs `on_finally` once the handle settles, whatever the outcome.
    ///
    /// The returned handle settles with the original outcome.
    pub fn finally<F>(&self, on_finally: F) -> Deferred<T, E>
    where
        F: FnOnce() + Send + 'static,
    {
        let (chained, settle) = Deferred::pending(&self.handle);
        self.react(move |outcome| {
            on_finally();
            settle.complete(outcome);
        });
        chained
    }

    // Registers a raw observer. It runs as a scheduler job, never inline.
    pub(crate) fn react(&self, reaction: impl FnOnce(Result<T, E>) + Send + 'static) {
        let mut cell = lock(&self.cell);
        let settled = cell.state.settled();
        match settled {
            None => cell.reactions.push(Box::new(reaction)),
            Some(outcome) => {
                drop(cell);
                self.handle.spawn(move || reaction(outcome));
            }
        }
    }
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            handle: self.handle.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &lock(&self.cell).state)
            .finish()
    }
}

impl<T, E> Future for Deferred<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut cell = lock(&self.cell);
        if let Some(outcome) = cell.state.settled() {
            return Poll::Ready(outcome);
        }
        if !cell.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            cell.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
