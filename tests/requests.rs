mod common;

use std::sync::Arc;

use common::{FakeTransport, ms, simulated};
use settle::{
    Error, Scheduler, State,
    demo::{self, Endpoints},
    request::{Request, from_request},
    sink::{MemorySink, OutputSink},
};

const USER: &str = "http://localhost:3000/users/7";

fn primary(path: &str) -> String {
    format!("http://localhost:3000/{path}")
}

fn sink() -> (MemorySink, Arc<dyn OutputSink>) {
    let memory = MemorySink::new();
    let sink: Arc<dyn OutputSink> = Arc::new(memory.clone());
    (memory, sink)
}

#[test]
fn success_fulfills_with_the_body() {
    common::init_tracing();
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let transport = FakeTransport::new().respond(USER, 200, r#"{"id":7}"#);

    let user = from_request(&handle, &transport, Request::get(USER));
    scheduler.run();

    assert_eq!(user.state(), State::Fulfilled(r#"{"id":7}"#.to_string()));
    assert_eq!(transport.sent(), 1, "Exactly one request should be sent");
}

#[test]
fn failure_status_rejects_with_status_text() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let transport = FakeTransport::new().respond(USER, 404, "missing");

    let user = from_request(&handle, &transport, Request::get(USER));
    let state = scheduler.run_until_settled(&user);

    assert_eq!(
        state,
        State::Rejected(Error::Response {
            status: 404,
            status_text: "Not Found".to_string()
        })
    );
}

#[test]
fn transport_failure_rejects_separately() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let transport = FakeTransport::new();

    let user = from_request(&handle, &transport, Request::get(USER));
    scheduler.run();

    assert!(
        matches!(user.state(), State::Rejected(Error::Transport(_))),
        "A request without any response should be a transport failure"
    );
}

#[test]
fn invalid_url_fails_the_producer() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let transport = FakeTransport::new();

    let user = from_request(&handle, &transport, Request::get("not a url"));

    assert!(
        matches!(user.state(), State::Rejected(Error::Producer(_))),
        "Bad URL should reject right away"
    );
    assert_eq!(transport.sent(), 0, "Nothing should be sent");
    scheduler.run();
}

#[test]
fn simulated_time_waits_for_outstanding_requests() {
    let (scheduler, handle, clock) = simulated();
    let transport = FakeTransport::new().respond_after(USER, ms(20), 200, "late");

    let user = from_request(&handle, &transport, Request::get(USER));
    scheduler.run();

    assert_eq!(user.state(), State::Fulfilled("late".to_string()));
    assert_eq!(
        clock.elapsed(),
        ms(0),
        "Virtual time should not move for I/O"
    );
}

#[test]
fn request_demo_renders_body_or_reason() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let endpoints = Endpoints::default();

    let (ok_memory, ok_sink) = sink();
    let found = FakeTransport::new().respond(USER, 200, "Ada");
    let _ok = demo::request(&handle, &ok_sink, &found, &endpoints);

    let (err_memory, err_sink) = sink();
    let missing = FakeTransport::new().respond(USER, 500, "");
    let _err = demo::request(&handle, &err_sink, &missing, &endpoints);
    scheduler.run();

    assert_eq!(ok_memory.contents(), "Ada");
    assert_eq!(err_memory.contents(), "500 Internal Server Error");
}

#[test]
fn all_requests_demo_appends_in_request_order() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let (memory, sink) = sink();
    let transport = FakeTransport::new()
        .respond_after(&primary("itemCategories"), ms(30), 200, "[categories]")
        .respond_after(&primary("orderStatuses"), ms(10), 200, "[statuses]")
        .respond(&primary("userTypes"), 200, "[types]");

    let done = demo::all_requests(&handle, &sink, &transport, &Endpoints::default());
    scheduler.run();

    assert!(done.state().is_fulfilled());
    assert_eq!(memory.contents(), "[categories]\n[statuses]\n[types]");
}

#[test]
fn all_requests_demo_renders_the_first_failure() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let (memory, sink) = sink();
    let transport = FakeTransport::new()
        .respond(&primary("itemCategories"), 200, "[categories]")
        .respond(&primary("orderStatuses"), 503, "")
        .respond_after(&primary("userTypes"), ms(50), 200, "[types]");

    let done = demo::all_requests(&handle, &sink, &transport, &Endpoints::default());
    scheduler.run();

    assert!(done.state().is_fulfilled(), "Rendering the failure should succeed");
    assert_eq!(
        memory.contents(),
        "503 Service Unavailable",
        "Output should be the reason of the first failure only"
    );
}

#[test]
fn all_settled_demo_renders_one_line_per_request() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let (memory, sink) = sink();
    let transport = FakeTransport::new()
        .respond(&primary("itemCategories"), 200, "[categories]")
        .respond(&primary("orderStatuses"), 200, "[statuses]")
        .respond(&primary("userTypes"), 200, "[types]")
        .respond(&primary("h"), 404, "");

    let _done = demo::all_settled_requests(&handle, &sink, &transport, &Endpoints::default());
    scheduler.run();

    let expected = [
        "Fulfilled: [categories]",
        "Fulfilled: [statuses]",
        "Fulfilled: [types]",
        "Rejected: 404 Not Found",
    ];
    assert_eq!(memory.contents(), expected.join("\n"));
}

#[test]
fn race_demo_renders_the_first_answer() {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let (memory, sink) = sink();
    let transport = FakeTransport::new()
        .respond_after(&primary("users"), ms(200), 200, "[primary]")
        .respond_after("http://localhost:3001/users", ms(5), 200, "[backup]");

    let _done = demo::race_requests(&handle, &sink, &transport, &Endpoints::default());
    scheduler.run();

    assert_eq!(
        memory.contents(),
        "[backup]",
        "The faster service should win"
    );
}

#[test]
fn timer_demos_render_after_the_delay() {
    let (scheduler, handle, clock) = simulated();
    let (timeout_memory, timeout_sink) = sink();
    let (chain_memory, chain_sink) = sink();

    let _timeout = demo::timeout(&handle, &timeout_sink);
    let _chain = demo::clear_interval_chain(&handle, &chain_sink);
    scheduler.run();

    assert_eq!(timeout_memory.contents(), "Timeout!");
    assert_eq!(chain_memory.contents(), "Timeout! ");
    assert_eq!(clock.elapsed(), demo::DEMO_DELAY);
    assert_eq!(
        handle.active_timers(),
        0,
        "Chained interval should be released"
    );
}

#[test]
fn interval_demo_leaks_its_timer() {
    let (scheduler, handle, _clock) = simulated();
    let (memory, sink) = sink();

    let (rendered, cancellation) = demo::interval(&handle, &sink);
    scheduler.run_for(demo::DEMO_DELAY * 3);

    assert!(rendered.state().is_fulfilled());
    assert_eq!(memory.contents(), "Timeout! ");
    assert_eq!(handle.timer_fires(), 3, "Interval should keep firing");
    assert_eq!(handle.active_timers(), 1);

    assert!(cancellation.cancel());
    assert_eq!(handle.active_timers(), 0);
}
