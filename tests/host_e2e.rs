//! End-to-end tests for the host run loop, timers, and shutdown.

use interflux::{
    reply, request, send, timeout, using, wait_for, wait_if, Event, Host, Outcome, Request, Scoped,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, PartialEq)]
struct Digit(u8);

struct Done;

struct Gauge {
    releases: Arc<AtomicU32>,
}

impl Scoped for Gauge {
    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn run_completes_on_a_submitted_event() {
    init_logging();
    let host = Host::new(|_| reply(()));
    let handle = host.handle();
    let worker = std::thread::spawn(move || {
        handle.submit(Event::new(Digit(5))).unwrap();
    });
    let result = host.run(wait_for(|digit: &Digit| Some(digit.0)));
    worker.join().unwrap();
    match result {
        Some(Outcome::Value(5)) => {}
        _ => panic!("the routine completes with the submitted digit"),
    }
}

#[test]
fn requests_are_resolved_before_any_event_is_needed() {
    init_logging();
    struct AskExtension;
    let host = Host::new(|request: Request| {
        assert!(request.is::<AskExtension>());
        reply(700_u32)
    });
    let result = host.run(request::<u32, _>(AskExtension));
    match result {
        Some(Outcome::Value(700)) => {}
        _ => panic!("the reply resolves the routine without events"),
    }
}

#[test]
fn commands_arrive_at_the_host_in_program_order() {
    init_logging();
    struct Yield(u32);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let host = Host::new(move |request: Request| {
        sink.lock().unwrap().push(request.downcast::<Yield>().unwrap().0);
        reply(())
    });
    let handle = host.handle();
    let worker = std::thread::spawn(move || {
        handle.submit(Event::new(Done)).unwrap();
    });
    let routine = send(Yield(0))
        .then(send(Yield(1)))
        .then(send(Yield(2)))
        .then(wait_if::<Done>(|_| true));
    let result = host.run(routine);
    worker.join().unwrap();
    assert!(matches!(result, Some(Outcome::Value(()))));
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn sleep_completes_after_its_deadline() {
    init_logging();
    let host = Host::new(|_| reply(())).with_timers();
    let timers = Arc::clone(host.timers().expect("timers enabled"));
    let started = Instant::now();
    let result = host.run(timers.sleep(Duration::from_millis(20)));
    assert!(matches!(result, Some(Outcome::Value(()))));
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[test]
fn timeout_yields_none_when_the_deadline_wins() {
    init_logging();
    let host = Host::new(|_| reply(())).with_timers();
    let timers = Arc::clone(host.timers().expect("timers enabled"));
    let result = host.run(timeout(
        &timers,
        Duration::from_millis(10),
        wait_if::<Done>(|_| true),
    ));
    match result {
        Some(Outcome::Value(None)) => {}
        _ => panic!("the deadline fires first"),
    }
    assert_eq!(timers.pending(), 0, "the fired timer is gone");
}

#[test]
fn timeout_yields_the_value_when_the_routine_wins() {
    init_logging();
    let host = Host::new(|_| reply(())).with_timers();
    let timers = Arc::clone(host.timers().expect("timers enabled"));
    let handle = host.handle();
    let worker = std::thread::spawn(move || {
        handle.submit(Event::new(Done)).unwrap();
    });
    let result = host.run(timeout(
        &timers,
        Duration::from_secs(3600),
        wait_if::<Done>(|_| true),
    ));
    worker.join().unwrap();
    match result {
        Some(Outcome::Value(Some(()))) => {}
        _ => panic!("the routine beats the deadline"),
    }
    assert_eq!(timers.pending(), 0, "the losing timer is cancelled");
}

#[test]
fn shutdown_unwinds_the_root_and_returns_none() {
    init_logging();
    let releases = Arc::new(AtomicU32::new(0));
    let gauge = Gauge {
        releases: Arc::clone(&releases),
    };
    let host = Host::new(|_| reply(()));
    let handle = host.handle();
    let worker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        handle.shutdown();
    });
    let result = host.run(using(gauge, |_| wait_if::<Done>(|_| true)));
    worker.join().unwrap();
    assert!(result.is_none(), "shutdown surfaces as None");
    assert_eq!(releases.load(Ordering::SeqCst), 1, "resources released");
}

#[test]
fn events_submitted_before_shutdown_are_still_dispatched() {
    init_logging();
    let host = Host::new(|_| reply(()));
    let handle = host.handle();
    handle.submit(Event::new(Digit(9))).unwrap();
    handle.shutdown();
    let result = host.run(wait_for(|digit: &Digit| Some(digit.0)));
    match result {
        Some(Outcome::Value(9)) => {}
        _ => panic!("queued events are drained before the cancellation"),
    }
}

#[test]
fn a_failing_routine_surfaces_its_fault_to_run() {
    init_logging();
    let host = Host::new(|_| Outcome::Error(interflux::Fault::msg("switch offline")));
    struct AskExtension;
    let result = host.run(request::<u32, _>(AskExtension));
    match result {
        Some(Outcome::Error(fault)) => assert_eq!(format!("{fault}"), "switch offline"),
        _ => panic!("the fault surfaces to the caller of run"),
    }
}
