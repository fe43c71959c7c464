#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use settle::{
    Error, Scheduler, SchedulerHandle,
    clock::ManualClock,
    request::{Completion, Request, Response, Transport},
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn simulated() -> (Scheduler, SchedulerHandle, ManualClock) {
    init_tracing();
    let clock = ManualClock::new();
    let scheduler = Scheduler::with_clock(clock.clone());
    let handle = scheduler.handle();
    (scheduler, handle, clock)
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Answers requests from a fixed route table, each after a real delay on its
/// own thread. Unknown URLs fail like a refused connection.
#[derive(Default)]
pub struct FakeTransport {
    routes: HashMap<String, (Duration, Result<Response, Error>)>,
    sent: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.respond_after(url, Duration::ZERO, status, body)
    }

    pub fn respond_after(mut self, url: &str, delay: Duration, status: u16, body: &str) -> Self {
        let response = Response::new(status, body);
        self.routes.insert(url.to_string(), (delay, Ok(response)));
        self
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: Request, completion: Completion) {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let refused = || {
            let reason = format!("connection refused: {}", request.url);
            (Duration::ZERO, Err(Error::Transport(reason)))
        };
        let (delay, result) = self.routes.get(&request.url).cloned().unwrap_or_else(refused);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            completion(result);
        });
    }
}
