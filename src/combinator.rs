//! Combinators that aggregate a fixed set of handles into one.
//!
//! - [`wait_for_all`]: every input must fulfill, the first rejection wins.
//! - [`wait_for_all_settled`]: waits for every input and reports each outcome.
//! - [`race`]: adopts whichever input settles first, fulfilled or not.
//!
//! Aggregated values are always in input order, never in settlement order.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use tracing::debug;

use crate::{Deferred, SchedulerHandle, scheduler::lock};

/// Whether an input was fulfilled or rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Fulfilled,
    Rejected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Fulfilled => write!(f, "Fulfilled"),
            Status::Rejected => write!(f, "Rejected"),
        }
    }
}

/// The settled outcome of one input, as reported by [`wait_for_all_settled`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Fulfilled(_) => Status::Fulfilled,
            Outcome::Rejected(_) => Status::Rejected,
        }
    }

    /// The value, if fulfilled.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fulfilled(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    /// The reason, if rejected.
    pub fn reason(&self) -> Option<&E> {
        match self {
            Outcome::Fulfilled(_) => None,
            Outcome::Rejected(reason) => Some(reason),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Fulfilled(value),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

// Index-aligned results of the inputs that settled so far.
struct Slots<T> {
    remaining: usize,
    slots: Vec<Option<T>>,
}

impl<T> Slots<T> {
    fn new(len: usize) -> Self {
        Self {
            remaining: len,
            slots: (0..len).map(|_| None).collect(),
        }
    }

    // Returns every result, in order, once the last slot is filled.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.replace(value).is_none() {
                self.remaining -= 1;
            }
        }
        (self.remaining == 0).then(|| {
            std::mem::take(&mut self.slots)
                .into_iter()
                .flatten()
                .collect()
        })
    }
}

/// Fulfills with every input value, in input order, once all inputs have
/// fulfilled. Rejects with the reason of the first input to reject, without
/// waiting for the others.
///
/// With no inputs the returned handle is fulfilled with an empty `Vec` right
/// away.
pub fn wait_for_all<T, E>(
    handle: &SchedulerHandle,
    inputs: impl IntoIterator<Item = Deferred<T, E>>,
) -> Deferred<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let inputs: Vec<_> = inputs.into_iter().collect();
    let (aggregate, settle) = Deferred::pending(handle);
    if inputs.is_empty() {
        settle.fulfill(Vec::new());
        return aggregate;
    }

    let slots = Arc::new(Mutex::new(Slots::new(inputs.len())));
    for (index, input) in inputs.iter().enumerate() {
        let slots = Arc::clone(&slots);
        let settle = settle.clone();
        input.react(move |outcome| match outcome {
            Ok(value) => {
                let values = lock(&slots).fill(index, value);
                if let Some(values) = values {
                    debug!(inputs = values.len(), "all inputs fulfilled");
                    settle.fulfill(values);
                }
            }
            Err(reason) => {
                if settle.reject(reason) {
                    debug!(index, "input rejected, not waiting for the rest");
                }
            }
        });
    }
    aggregate
}

/// Fulfills with one [`Outcome`] per input, in input order, once every input
/// has settled. Never rejects.
///
/// With no inputs the returned handle is fulfilled with an empty `Vec` right
/// away.
pub fn wait_for_all_settled<T, E>(
    handle: &SchedulerHandle,
    inputs: impl IntoIterator<Item = Deferred<T, E>>,
) -> Deferred<Vec<Outcome<T, E>>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let inputs: Vec<_> = inputs.into_iter().collect();
    let (aggregate, settle) = Deferred::pending(handle);
    if inputs.is_empty() {
        settle.fulfill(Vec::new());
        return aggregate;
    }

    let slots = Arc::new(Mutex::new(Slots::new(inputs.len())));
    for (index, input) in inputs.iter().enumerate() {
        let slots = Arc::clone(&slots);
        let settle = settle.clone();
        input.react(move |outcome| {
            let outcomes = lock(&slots).fill(index, Outcome::from(outcome));
            if let Some(outcomes) = outcomes {
                debug!(inputs = outcomes.len(), "all inputs settled");
                settle.fulfill(outcomes);
            }
        });
    }
    aggregate
}

/// Settles like whichever input settles first, fulfilled or rejected. Later
/// settlements are ignored.
///
/// With no inputs the returned handle never settles.
pub fn race<T, E>(
    handle: &SchedulerHandle,
    inputs: impl IntoIterator<Item = Deferred<T, E>>,
) -> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let (aggregate, settle) = Deferred::pending(handle);
    let mut entrants = 0usize;
    for (index, input) in inputs.into_iter().enumerate() {
        entrants += 1;
        let settle = settle.clone();
        input.react(move |outcome| {
            if settle.complete(outcome) {
                debug!(index, "race settled");
            }
        });
    }
    if entrants == 0 {
        debug!("race over no inputs, it will never settle");
    }
    aggregate
}

/// Extends collections of handles with the combinators.
///
/// # Example
/// ```
/// # use settle::{Combine, Error, Scheduler, State, timing::after_delay};
/// # use std::time::Duration;
/// let scheduler = Scheduler::new();
/// let handle = scheduler.handle();
///
/// let both = vec![
///     after_delay::<_, Error>(&handle, Duration::from_millis(20), "a"),
///     after_delay(&handle, Duration::from_millis(5), "b"),
/// ]
/// .wait_for_all(&handle);
///
/// assert_eq!(scheduler.run_until_settled(&both), State::Fulfilled(vec!["a", "b"]));
/// ```
pub trait Combine<T, E>: IntoIterator<Item = Deferred<T, E>> + Sized
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// See [`wait_for_all`].
    fn wait_for_all(self, handle: &SchedulerHandle) -> Deferred<Vec<T>, E> {
        wait_for_all(handle, self)
    }

    /// See [`wait_for_all_settled`].
    fn wait_for_all_settled(self, handle: &SchedulerHandle) -> Deferred<Vec<Outcome<T, E>>, E> {
        wait_for_all_settled(handle, self)
    }

    /// See [`race`].
    fn race(self, handle: &SchedulerHandle) -> Deferred<T, E> {
        race(handle, self)
    }
}

impl<I, T, E> Combine<T, E> for I
where
    I: IntoIterator<Item = Deferred<T, E>>,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
}
