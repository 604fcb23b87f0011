//! The change-wait coordinator
//!
//! Wires the watch session, idle timeout, interactive abort reader and
//! cancellation poller into one blocking call that returns when the watched
//! files have settled, the caller cancels, or the watcher fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{WaitError, WaitResult};

use super::cancel::CancellationToken;
use super::idle::IdleTimeout;
use super::input::{InputByte, InteractiveInput, SubscriptionGuard};
use super::session::{ChangeHandler, ErrorHandler, FileSet, SessionCell, WatchSessionFactory};
use super::{ABORT_KEY, POLL_INTERVAL, QUIET_PERIOD};

/// One-shot completion gate. Opens once and stays open; later opens are
/// no-ops. The open transition is the wait's single linearization point.
pub(crate) struct CompletionLatch {
    opened: Mutex<bool>,
    cond: Condvar,
}

impl CompletionLatch {
    pub(crate) fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn open(&self) {
        let mut opened = self.opened.lock().unwrap();
        if !*opened {
            *opened = true;
            self.cond.notify_all();
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.opened.lock().unwrap()
    }

    pub(crate) fn wait(&self) {
        let mut opened = self.opened.lock().unwrap();
        while !*opened {
            opened = self.cond.wait(opened).unwrap();
        }
    }
}

/// Named background threads for one wait call.
pub(crate) struct WorkerSet {
    prefix: &'static str,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopping: AtomicBool,
}

impl WorkerSet {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            handles: Mutex::new(Vec::new()),
            stopping: AtomicBool::new(false),
        }
    }

    pub(crate) fn spawn(
        &self,
        label: &str,
        work: impl FnOnce() + Send + 'static,
    ) -> WaitResult<()> {
        if self.is_stopping() {
            return Ok(());
        }
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.prefix, label))
            .spawn(work)?;
        self.handles.lock().unwrap().push(handle);
        Ok(())
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Flag shutdown and join every worker. Every worker has a cooperative
    /// prompt-exit path, so joins are bounded by the poll interval or quiet
    /// period. Join failures are logged, never surfaced.
    pub(crate) fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        loop {
            let drained: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
            if drained.is_empty() {
                break;
            }
            for handle in drained {
                let name = handle.thread().name().unwrap_or("worker").to_string();
                if handle.join().is_err() {
                    tracing::warn!("worker thread '{name}' panicked during wait teardown");
                }
            }
        }
    }
}

/// Teardown for one wait call, run exactly once on every exit path
/// (normal return, watch failure, cancellation, or a panic while blocked).
struct WaitGuard {
    cell: Arc<SessionCell>,
    active_timer: Arc<Mutex<Option<Arc<IdleTimeout>>>>,
    subscription: SubscriptionGuard,
    workers: Arc<WorkerSet>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.cell.stop();
        if let Some(timer) = self.active_timer.lock().unwrap().as_ref() {
            timer.cancel();
        }
        self.subscription.detach();
        self.workers.shutdown();
    }
}

/// Blocks a continuous build loop until its inputs settle.
///
/// After each build the loop calls [`ChangeWaiter::wait`]; it returns once
/// the watched file set has stopped changing for a full quiet period, the
/// shared token is cancelled (Ctrl+C, or Ctrl-D / end-of-stream on the
/// interactive input), or the watch session reports an error.
pub struct ChangeWaiter {
    factory: Arc<dyn WatchSessionFactory>,
    input: Arc<InteractiveInput>,
    quiet_period: Duration,
    poll_interval: Duration,
}

impl ChangeWaiter {
    pub fn new(factory: Arc<dyn WatchSessionFactory>, input: Arc<InteractiveInput>) -> Self {
        Self {
            factory,
            input,
            quiet_period: QUIET_PERIOD,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the quiet period (defaults to [`QUIET_PERIOD`]).
    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    /// Override the cancellation poll interval (defaults to [`POLL_INTERVAL`]).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Block until the watched files settle or the wait is cancelled.
    ///
    /// The notifier runs exactly once, synchronously, just before blocking.
    /// Cancellation is a normal `Ok(())` return; only a watch failure is an
    /// error. Whatever the outcome, the session is stopped and every
    /// background worker has exited before this returns.
    pub fn wait(
        &self,
        files: &FileSet,
        token: Arc<CancellationToken>,
        notifier: impl FnOnce(),
    ) -> WaitResult<()> {
        let latch = Arc::new(CompletionLatch::new());
        let error_slot: Arc<Mutex<Option<WaitError>>> = Arc::default();
        let workers = Arc::new(WorkerSet::new("change-wait"));
        let cell = Arc::new(SessionCell::new());
        let active_timer: Arc<Mutex<Option<Arc<IdleTimeout>>>> = Arc::default();

        let on_error: ErrorHandler = {
            let latch = latch.clone();
            let slot = error_slot.clone();
            Box::new(move |cause| {
                // Last write wins under a true multi-source race; the gate
                // opens either way and exactly one error surfaces.
                *slot.lock().unwrap() = Some(WaitError::watch_failed(cause));
                latch.open();
            })
        };

        let on_change: ChangeHandler = {
            let latch = latch.clone();
            let cell = cell.clone();
            let timer_slot = active_timer.clone();
            let workers = workers.clone();
            let quiet_period = self.quiet_period;
            Box::new(move |_event| {
                let mut slot = timer_slot.lock().unwrap();
                if slot.is_none() {
                    if workers.is_stopping() {
                        return;
                    }
                    let timer = Arc::new(IdleTimeout::new(quiet_period, {
                        let cell = cell.clone();
                        let latch = latch.clone();
                        move || {
                            cell.stop();
                            latch.open();
                        }
                    }));
                    let waiter = timer.clone();
                    match workers.spawn("idle", move || waiter.await_idle()) {
                        Ok(()) => *slot = Some(timer),
                        Err(e) => {
                            tracing::warn!("failed to spawn idle-timeout worker: {e}");
                            return;
                        }
                    }
                }
                // The first notification ticks too: quiescence needs a full
                // quiet period after it, never an immediate fire.
                if let Some(timer) = slot.as_ref() {
                    timer.tick();
                }
            })
        };

        let session = self.factory.create(files, on_error, on_change)?;
        cell.install(session);

        let (subscription, subscription_guard) = self.input.subscribe();
        let _teardown = WaitGuard {
            cell,
            active_timer,
            subscription: subscription_guard,
            workers: workers.clone(),
        };

        {
            let token = token.clone();
            workers.spawn("stdin", move || loop {
                match subscription.next() {
                    InputByte::Byte(ABORT_KEY) | InputByte::Eof => {
                        token.request_cancellation();
                        break;
                    }
                    InputByte::Byte(_) => {}
                    InputByte::Detached => break,
                }
            })?;
        }

        {
            let latch = latch.clone();
            let workers_handle = workers.clone();
            let poll_interval = self.poll_interval;
            workers.spawn("poll", move || loop {
                if token.is_cancellation_requested() {
                    latch.open();
                    break;
                }
                if workers_handle.is_stopping() {
                    break;
                }
                thread::sleep(poll_interval);
            })?;
        }

        notifier();
        latch.wait();

        let result = match error_slot.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        result
    }
}
