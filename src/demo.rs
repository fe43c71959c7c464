//! Ready-made demonstrations of the producers and combinators.
//!
//! Each function wires a few handles together, renders the result to an
//! [`OutputSink`] and returns the final handle, which settles once the output
//! has been written. Run the handle's scheduler to see anything happen.
//!
//! The request-based demonstrations talk to a small REST service expected at
//! [`Endpoints::primary`] (and [`Endpoints::backup`] for [`race_requests`]).

use std::{sync::Arc, time::Duration};

use crate::{
    Combine, Deferred, Error, SchedulerHandle,
    combinator::Outcome,
    periodic::{Cancellation, on_recurring_tick},
    request::{Request, Transport, from_request},
    sink::OutputSink,
    timing::after_delay,
};

/// Delay used by the timer demonstrations.
pub const DEMO_DELAY: Duration = Duration::from_millis(1500);

/// Base URLs of the services the request demonstrations call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub primary: String,
    pub backup: String,
}

impl Endpoints {
    pub fn with_primary(mut self, base: impl Into<String>) -> Self {
        self.primary = base.into();
        self
    }

    pub fn with_backup(mut self, base: impl Into<String>) -> Self {
        self.backup = base.into();
        self
    }

    /// `path` resolved against the primary service.
    pub fn primary_url(&self, path: &str) -> String {
        join(&self.primary, path)
    }

    /// `path` resolved against the backup service.
    pub fn backup_url(&self, path: &str) -> String {
        join(&self.backup, path)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            primary: "http://localhost:3000".to_string(),
            backup: "http://localhost:3001".to_string(),
        }
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Renders `"Timeout!"` after [`DEMO_DELAY`].
pub fn timeout(handle: &SchedulerHandle, sink: &Arc<dyn OutputSink>) -> Deferred<(), Error> {
    let sink = Arc::clone(sink);
    after_delay(handle, DEMO_DELAY, "Timeout!".to_string())
        .then(move |text| sink.render(&text))
}

/// Renders `"Timeout! "` on the first tick of an interval and never stops it.
///
/// This reproduces the leak: the returned handle settles once, but the
/// interval keeps firing until the returned [`Cancellation`] is used. Prefer
/// [`clear_interval_chain`].
pub fn interval(
    handle: &SchedulerHandle,
    sink: &Arc<dyn OutputSink>,
) -> (Deferred<(), Error>, Cancellation) {
    let sink = Arc::clone(sink);
    let (tick, cancellation) = on_recurring_tick(handle, DEMO_DELAY, "Timeout! ".to_string());
    (tick.then(move |text| sink.render(&text)), cancellation)
}

/// Like [`interval`], but releases the interval once the output is written.
pub fn clear_interval_chain(
    handle: &SchedulerHandle,
    sink: &Arc<dyn OutputSink>,
) -> Deferred<(), Error> {
    let sink = Arc::clone(sink);
    let (tick, cancellation) = on_recurring_tick(handle, DEMO_DELAY, "Timeout! ".to_string());
    let rendered = tick.then(move |text| sink.render(&text));
    cancellation.cancel_on_settle(&rendered)
}

/// Fetches `users/7` and renders the body, or the failure reason.
pub fn request(
    handle: &SchedulerHandle,
    sink: &Arc<dyn OutputSink>,
    transport: &dyn Transport,
    endpoints: &Endpoints,
) -> Deferred<(), Error> {
    let request = Request::get(endpoints.primary_url("users/7"));
    let user = from_request(handle, transport, request);
    render_outcome(&user, sink, |sink, body| sink.render(&body))
}

/// Fetches three lookup tables at once and appends each body, in request
/// order. Any failure replaces the output with its reason.
pub fn all_requests(
    handle: &SchedulerHandle,
    sink: &Arc<dyn OutputSink>,
    transport: &dyn Transport,
    endpoints: &Endpoints,
) -> Deferred<(), Error> {
    let lookups = ["itemCategories", "orderStatuses", "userTypes"]
        .into_iter()
        .map(|path| Request::get(endpoints.primary_url(path)))
        .map(|request| from_request(handle, transport, request))
        .wait_for_all(handle);

    render_outcome(&lookups, sink, |sink, bodies| {
        sink.render("");
        for body in &bodies {
            sink.append(body);
        }
    })
}

/// Fetches four resources at once (one of which does not exist) and renders
/// one `Fulfilled: ...` or `Rejected: ...` line per request.
///
/// Each line carries the whole response body as text, or the reason's
/// message. Bodies are not parsed.
pub fn all_settled_requests(
    handle: &SchedulerHandle,
    sink: &Arc<dyn OutputSink>,
    transport: &dyn Transport,
    endpoints: &Endpoints,
) -> Deferred<(), Error> {
    let lookups = ["itemCategories", "orderStatuses", "userTypes", "h"]
        .into_iter()
        .map(|path| Request::get(endpoints.primary_url(path)))
        .map(|request| from_request(handle, transport, request))
        .wait_for_all_settled(handle);

    render_outcome(&lookups, sink, |sink, outcomes| {
        let lines: Vec<String> = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Outcome::Fulfilled(body) => format!("Fulfilled: {body}"),
                Outcome::Rejected(reason) => format!("Rejected: {reason}"),
            })
            .collect();
        sink.render_lines(&lines);
    })
}

/// Asks the primary and the backup service for `users` and renders whichever
/// answers first, even if that answer is a failure.
pub fn race_requests(
    handle: &SchedulerHandle,
    sink: &Arc<dyn OutputSink>,
    transport: &dyn Transport,
    endpoints: &Endpoints,
) -> Deferred<(), Error> {
    let users = [endpoints.primary_url("users"), endpoints.backup_url("users")]
        .into_iter()
        .map(|url| from_request(handle, transport, Request::get(url)))
        .race(handle);

    render_outcome(&users, sink, |sink, body| sink.render(&body))
}

// Renders the value with `on_value`, or the stringified reason.
fn render_outcome<T, F>(
    deferred: &Deferred<T, Error>,
    sink: &Arc<dyn OutputSink>,
    on_value: F,
) -> Deferred<(), Error>
where
    T: Clone + Send + 'static,
    F: FnOnce(&dyn OutputSink, T) + Send + 'static,
{
    let value_sink = Arc::clone(sink);
    let reason_sink = Arc::clone(sink);
    deferred.on_settle(
        move |value| {
            on_value(value_sink.as_ref(), value);
            Ok(())
        },
        move |reason| {
            reason_sink.render(&reason.to_string());
            Ok(())
        },
    )
}
