//! Deferred results and the combinators that join them.
//!
//! `settle` models values that are not known yet as [`Deferred`] handles. A
//! handle is created by a producer (a timer, a repeating timer, a network
//! request or any closure holding its [`Settle`]) and settles exactly once,
//! fulfilled or rejected. Handles can be chained, and fixed sets of them can
//! be combined under three completion policies.
//!
//! Features include:
//! - A single-threaded cooperative [`Scheduler`] that runs every observer as
//!   its own job, with a pluggable [`Clock`](clock::Clock) so timers can run
//!   in simulated time
//! - Time-based producers: [`after_delay`](timing::after_delay),
//!   [`reject_after`](timing::reject_after) and the cancellable
//!   [`on_recurring_tick`](periodic::on_recurring_tick)
//! - A request producer, [`from_request`](request::from_request), over any
//!   [`Transport`](request::Transport), with a `reqwest` implementation
//! - The [`wait_for_all`], [`wait_for_all_settled`] and [`race`] combinators
//! - Small demonstrations in [`demo`] that report to an
//!   [`OutputSink`](sink::OutputSink)
//!
//! Handles also implement [`Future`], so they can be awaited from any
//! executor while a scheduler drives them.

pub mod clock;
pub mod combinator;
pub mod deferred;
pub mod demo;
mod error;
pub mod periodic;
pub mod request;
pub mod scheduler;
pub mod sink;
pub mod timing;

pub use combinator::{Combine, Outcome, Status, race, wait_for_all, wait_for_all_settled};
pub use deferred::{Deferred, Settle, State};
pub use error::Error;
pub use scheduler::{Scheduler, SchedulerHandle};
