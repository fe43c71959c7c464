use std::sync::Arc;

use settle::{
    Error, Scheduler,
    demo::{self, DEMO_DELAY, Endpoints},
    request::HttpTransport,
    sink::{OutputSink, StdoutSink},
};

// Start a REST service on localhost:3000 (and a copy on localhost:3001) to
// see bodies instead of connection errors.
fn main() -> Result<(), Error> {
    let scheduler = Scheduler::new();
    let handle = scheduler.handle();
    let sink: Arc<dyn OutputSink> = Arc::new(StdoutSink);
    let transport = HttpTransport::new()?;
    let endpoints = Endpoints::default();

    println!("-- timeout");
    let done = demo::timeout(&handle, &sink);
    scheduler.run_until_settled(&done);

    println!("-- interval, never cleared");
    let (done, cancellation) = demo::interval(&handle, &sink);
    // `run` would never return here.
    scheduler.run_for(DEMO_DELAY * 3);
    println!(
        "rendered: {}, ticks so far: {}",
        done.is_settled(),
        handle.timer_fires()
    );
    cancellation.cancel();

    println!("-- interval, cleared after the first tick");
    let before = handle.timer_fires();
    let _done = demo::clear_interval_chain(&handle, &sink);
    scheduler.run();
    println!("ticks: {}", handle.timer_fires() - before);

    println!("-- single request");
    let _done = demo::request(&handle, &sink, &transport, &endpoints);
    scheduler.run();

    println!("-- all requests");
    let _done = demo::all_requests(&handle, &sink, &transport, &endpoints);
    scheduler.run();

    println!("-- all requests, settled");
    let _done = demo::all_settled_requests(&handle, &sink, &transport, &endpoints);
    scheduler.run();

    println!("-- race");
    let _done = demo::race_requests(&handle, &sink, &transport, &endpoints);
    scheduler.run();

    Ok(())
}
