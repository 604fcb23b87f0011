//! Idle timeout: the debounce timer behind quiescence detection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct TimerState {
    last_tick: Instant,
    cancelled: bool,
}

/// Single-use idle timeout.
///
/// Created on the first change notification of a wait call. Every `tick`
/// pushes the deadline out to a full quiet period from the moment of the
/// tick; a dedicated worker blocks in [`IdleTimeout::await_idle`] until a
/// whole quiet period passes with no ticks, then runs the idle action once.
///
/// A single tick never fires early: the action runs no sooner than one quiet
/// period after the latest tick, however many ticks came before it.
pub struct IdleTimeout {
    quiet_period: Duration,
    state: Mutex<TimerState>,
    wakeup: Condvar,
    fired: AtomicBool,
    on_idle: Box<dyn Fn() + Send + Sync>,
}

impl IdleTimeout {
    /// Start timing from "now". `on_idle` runs at most once, on the thread
    /// that calls [`IdleTimeout::await_idle`].
    pub fn new(quiet_period: Duration, on_idle: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            quiet_period,
            state: Mutex::new(TimerState {
                last_tick: Instant::now(),
                cancelled: false,
            }),
            wakeup: Condvar::new(),
            fired: AtomicBool::new(false),
            on_idle: Box::new(on_idle),
        }
    }

    /// Record activity, extending the deadline. Callable from any thread;
    /// a no-op once the timer has fired.
    pub fn tick(&self) {
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.last_tick = Instant::now();
        self.wakeup.notify_all();
    }

    /// Abandon the timer without firing. Wakes a blocked `await_idle`.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancelled = true;
        self.wakeup.notify_all();
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Block until one full quiet period elapses with no ticks, then run the
    /// idle action, or return without firing if cancelled.
    ///
    /// The remaining wait is recomputed from the latest tick after every
    /// wakeup, so a tick racing a deadline check is never lost: both the
    /// tick write and the recomputation happen under the same lock.
    pub fn await_idle(&self) {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.cancelled {
                return;
            }
            let elapsed = state.last_tick.elapsed();
            if elapsed >= self.quiet_period {
                drop(state);
                if !self.fired.swap(true, Ordering::SeqCst) {
                    (self.on_idle)();
                }
                return;
            }
            let remaining = self.quiet_period - elapsed;
            let (next, _timed_out) = self.wakeup.wait_timeout(state, remaining).unwrap();
            state = next;
        }
    }
}
