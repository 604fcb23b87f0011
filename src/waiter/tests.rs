//! Tests for the change-wait coordinator
//!
//! Scripted doubles stand in for the watch backend and stdin so scenarios
//! can drive change, error and abort timing deterministically; one test at
//! the end goes through the real notify backend against a temp directory.

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::WaitError;

use super::cancel::CancellationToken;
use super::input::InteractiveInput;
use super::session::{
    ChangeEvent, ChangeHandler, ErrorHandler, FileSet, NotifySessionFactory, WatchSession,
    WatchSessionFactory,
};
use super::wait::ChangeWaiter;
use super::ABORT_KEY;

struct Handlers {
    on_error: ErrorHandler,
    on_change: ChangeHandler,
}

/// Watch-session double: records `stop()` calls and hands the registered
/// callbacks back to the test so it can play the backend's role.
#[derive(Default)]
struct ScriptedFactory {
    stops: Arc<AtomicUsize>,
    handlers: Arc<Mutex<Option<Handlers>>>,
}

struct ScriptedSession {
    stops: Arc<AtomicUsize>,
}

impl WatchSession for ScriptedSession {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl WatchSessionFactory for ScriptedFactory {
    fn create(
        &self,
        _files: &FileSet,
        on_error: ErrorHandler,
        on_change: ChangeHandler,
    ) -> crate::error::WaitResult<Arc<dyn WatchSession>> {
        *self.handlers.lock().unwrap() = Some(Handlers {
            on_error,
            on_change,
        });
        Ok(Arc::new(ScriptedSession {
            stops: self.stops.clone(),
        }))
    }
}

impl ScriptedFactory {
    fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Block until `wait` has registered its callbacks.
    fn await_handlers(&self) {
        while self.handlers.lock().unwrap().is_none() {
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn fire_change(&self) {
        let guard = self.handlers.lock().unwrap();
        let handlers = guard.as_ref().expect("session not created yet");
        (handlers.on_change)(ChangeEvent { paths: vec![] });
    }

    fn fire_error(&self, message: &str) {
        let guard = self.handlers.lock().unwrap();
        let handlers = guard.as_ref().expect("session not created yet");
        (handlers.on_error)(Box::new(std::io::Error::other(message.to_string())));
    }
}

/// Blocking stdin stand-in fed through a channel. Dropping the sender is
/// end-of-stream.
struct ScriptedStdin {
    rx: mpsc::Receiver<u8>,
}

impl Read for ScriptedStdin {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.rx.recv() {
            Ok(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            Err(_) => Ok(0),
        }
    }
}

fn scripted_input() -> (mpsc::Sender<u8>, Arc<InteractiveInput>) {
    let (tx, rx) = mpsc::channel();
    let input = Arc::new(InteractiveInput::from_reader(ScriptedStdin { rx }));
    (tx, input)
}

fn waiter_with(factory: Arc<ScriptedFactory>, input: Arc<InteractiveInput>) -> ChangeWaiter {
    ChangeWaiter::new(factory, input)
}

fn files() -> FileSet {
    FileSet::new([std::path::PathBuf::from(".")])
}

#[test]
fn test_settles_one_quiet_period_after_last_change() {
    let factory = Arc::new(ScriptedFactory::default());
    let (_stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    // Changes at ~0ms and ~100ms, both inside the 250ms quiet period
    let driver = factory.clone();
    let handle = thread::spawn(move || {
        driver.await_handlers();
        driver.fire_change();
        thread::sleep(Duration::from_millis(100));
        let last_tick = Instant::now();
        driver.fire_change();
        last_tick
    });

    let started = Instant::now();
    waiter.wait(&files(), token, || {}).unwrap();
    let last_tick = handle.join().unwrap();

    // Never earlier than one quiet period after the *last* change, so the
    // total is ~350ms, not 250ms
    assert!(last_tick.elapsed() >= Duration::from_millis(250));
    assert!(started.elapsed() >= Duration::from_millis(340));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(factory.stop_count(), 1);
}

#[test]
fn test_single_change_still_needs_full_quiet_period() {
    let factory = Arc::new(ScriptedFactory::default());
    let (_stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    let driver = factory.clone();
    let handle = thread::spawn(move || {
        driver.await_handlers();
        let ticked = Instant::now();
        driver.fire_change();
        ticked
    });

    waiter.wait(&files(), token, || {}).unwrap();
    let ticked = handle.join().unwrap();

    assert!(ticked.elapsed() >= Duration::from_millis(250));
    assert_eq!(factory.stop_count(), 1);
}

#[test]
fn test_cancellation_completes_within_poll_interval() {
    let factory = Arc::new(ScriptedFactory::default());
    let (_stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    let canceller = token.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.request_cancellation();
    });

    let started = Instant::now();
    let outcome = waiter.wait(&files(), token.clone(), || {});

    // Cancellation is a normal return, not an error, and no change ever
    // arrived so the idle timer never existed
    assert!(outcome.is_ok());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(token.is_cancellation_requested());
    assert_eq!(factory.stop_count(), 1);
}

#[test]
fn test_watch_error_is_surfaced_and_session_stopped() {
    let factory = Arc::new(ScriptedFactory::default());
    let (_stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    let driver = factory.clone();
    thread::spawn(move || {
        driver.await_handlers();
        thread::sleep(Duration::from_millis(10));
        driver.fire_error("inotify watch limit reached");
    });

    let outcome = waiter.wait(&files(), token, || {});

    let err = outcome.unwrap_err();
    assert!(matches!(err, WaitError::WatchFailed { .. }));
    assert!(err.to_string().contains("inotify watch limit reached"));
    assert_eq!(factory.stop_count(), 1);
}

#[test]
fn test_error_surfaces_regardless_of_cancellation_state() {
    let factory = Arc::new(ScriptedFactory::default());
    let (_stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    let driver = factory.clone();
    let canceller = token.clone();
    thread::spawn(move || {
        driver.await_handlers();
        // The error is recorded before cancellation is even requested, so it
        // must be surfaced no matter which signal opened the gate
        driver.fire_error("backend exploded");
        canceller.request_cancellation();
    });

    let outcome = waiter.wait(&files(), token, || {});
    assert!(outcome.is_err());
    assert_eq!(factory.stop_count(), 1);
}

#[test]
fn test_abort_key_requests_cancellation() {
    let factory = Arc::new(ScriptedFactory::default());
    let (stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    let key_sender = stdin.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = key_sender.send(ABORT_KEY);
    });

    let started = Instant::now();
    let outcome = waiter.wait(&files(), token.clone(), || {});

    assert!(outcome.is_ok());
    assert!(token.is_cancellation_requested());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(factory.stop_count(), 1);
}

#[test]
fn test_stdin_eof_requests_cancellation() {
    let factory = Arc::new(ScriptedFactory::default());
    let (stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        drop(stdin);
    });

    let outcome = waiter.wait(&files(), token.clone(), || {});
    assert!(outcome.is_ok());
    assert!(token.is_cancellation_requested());
}

#[test]
fn test_other_bytes_do_not_cancel() {
    let factory = Arc::new(ScriptedFactory::default());
    let (stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());

    stdin.send(b'q').unwrap();
    stdin.send(b'\n').unwrap();

    let canceller = token.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        canceller.request_cancellation();
    });

    let started = Instant::now();
    let outcome = waiter.wait(&files(), token.clone(), || {});
    assert!(outcome.is_ok());
    // Cancellation came from the token at 150ms, not from the typed bytes
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(token.is_cancellation_requested());
}

#[test]
fn test_notifier_runs_exactly_once_before_blocking() {
    let factory = Arc::new(ScriptedFactory::default());
    let (_stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);
    let token = Arc::new(CancellationToken::new());
    token.request_cancellation(); // return as soon as the poller sees it

    let notified = Arc::new(AtomicUsize::new(0));
    let notified_clone = notified.clone();
    waiter
        .wait(&files(), token, move || {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[test]
fn test_waiter_is_reusable_across_calls() {
    let factory = Arc::new(ScriptedFactory::default());
    let (_stdin, input) = scripted_input();
    let waiter = waiter_with(factory.clone(), input);

    for expected_stops in 1..=2 {
        let token = Arc::new(CancellationToken::new());
        token.request_cancellation();
        waiter.wait(&files(), token, || {}).unwrap();
        assert_eq!(factory.stop_count(), expected_stops);
    }
}

#[test]
fn test_quiescence_with_real_notify_backend() {
    use std::fs;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let root = dir.path().to_path_buf();
    fs::write(root.join("input.txt"), "v0").unwrap();

    let (_stdin, input) = scripted_input();
    let waiter = ChangeWaiter::new(Arc::new(NotifySessionFactory), input);
    let token = Arc::new(CancellationToken::new());

    let edited = root.clone();
    thread::spawn(move || {
        // Two edits inside one quiet period, after the watch is live
        thread::sleep(Duration::from_millis(300));
        fs::write(edited.join("input.txt"), "v1").unwrap();
        thread::sleep(Duration::from_millis(100));
        fs::write(edited.join("input.txt"), "v2").unwrap();
    });

    // Safety valve so a backend that drops events fails the test instead of
    // hanging the suite
    let bail_out = token.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(10));
        bail_out.request_cancellation();
    });

    let started = Instant::now();
    waiter
        .wait(&FileSet::new([root]), token, || {})
        .unwrap();

    // Settled some time after the second edit, via quiescence rather than
    // the safety valve; generous upper bound for CI
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(8));
}
