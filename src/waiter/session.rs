//! Watch sessions: live, stoppable subscriptions to filesystem events
//!
//! The coordinator only consumes the [`WatchSession`] contract; the
//! production backend wraps `notify`. Tests substitute their own factory to
//! drive change and error callbacks deterministically.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{WaitResult, WatchCause};

/// Immutable description of the paths to watch (each root recursively).
#[derive(Debug, Clone)]
pub struct FileSet {
    roots: Vec<PathBuf>,
}

impl FileSet {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// A change notification delivered by a watch session.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Paths the backend attributed to the change, possibly empty
    pub paths: Vec<PathBuf>,
}

/// Invoked asynchronously from a backend-owned thread on failure.
pub type ErrorHandler = Box<dyn Fn(WatchCause) + Send + Sync>;

/// Invoked asynchronously from a backend-owned thread, possibly many times.
pub type ChangeHandler = Box<dyn Fn(ChangeEvent) + Send + Sync>;

/// A live watch over one file set.
pub trait WatchSession: Send + Sync {
    /// Stop delivery. Idempotent, callable from any thread, must not block
    /// indefinitely. No further callbacks are delivered once this returns.
    fn stop(&self);
}

/// Creates watch sessions; the seam between the waiter and the OS backend.
pub trait WatchSessionFactory: Send + Sync {
    fn create(
        &self,
        files: &FileSet,
        on_error: ErrorHandler,
        on_change: ChangeHandler,
    ) -> WaitResult<Arc<dyn WatchSession>>;
}

/// Production factory backed by `notify`'s recommended platform watcher.
#[derive(Debug, Default)]
pub struct NotifySessionFactory;

struct NotifyWatchSession {
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl WatchSession for NotifyWatchSession {
    fn stop(&self) {
        // Dropping the watcher deregisters the OS watches and ends delivery.
        self.watcher.lock().unwrap().take();
    }
}

impl WatchSessionFactory for NotifySessionFactory {
    fn create(
        &self,
        files: &FileSet,
        on_error: ErrorHandler,
        on_change: ChangeHandler,
    ) -> WaitResult<Arc<dyn WatchSession>> {
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => on_change(ChangeEvent { paths: event.paths }),
                Err(e) => on_error(Box::new(e)),
            },
            Config::default(),
        )?;

        for root in files.roots() {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        Ok(Arc::new(NotifyWatchSession {
            watcher: Mutex::new(Some(watcher)),
        }))
    }
}

/// Coordinator-side stop guard around one session.
///
/// Two paths stop a session (the idle action and end-of-call teardown); the
/// guard collapses them so the underlying `stop` runs exactly once, and it
/// tolerates a stop racing session installation.
pub(crate) struct SessionCell {
    session: Mutex<Option<Arc<dyn WatchSession>>>,
    stopped: AtomicBool,
}

impl SessionCell {
    pub(crate) fn new() -> Self {
        Self {
            session: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn install(&self, session: Arc<dyn WatchSession>) {
        // The flag is re-checked under the slot lock so an install racing a
        // stop can never strand a running session.
        let mut slot = self.session.lock().unwrap();
        if self.stopped.load(Ordering::SeqCst) {
            drop(slot);
            session.stop();
            return;
        }
        *slot = Some(session);
    }

    pub(crate) fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(session) = self.session.lock().unwrap().take() {
            session.stop();
        }
    }
}
