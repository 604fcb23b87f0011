//! Quiesce - continuous-build change waiter
//!
//! Quiesce runs a command, watches its input files, and reruns the command
//! once the filesystem has settled: a change only counts once no further
//! changes follow it for a short quiet period, so an editor's
//! save-then-format burst triggers one rebuild, not three.

pub mod error;
pub mod waiter;

// Re-exports for convenience
pub use error::{WaitError, WaitResult, WatchCause};
pub use waiter::{
    CancellationToken, ChangeEvent, ChangeWaiter, FileSet, InteractiveInput, LoopEvent,
    NotifySessionFactory, WatchSession, WatchSessionFactory, ABORT_KEY, POLL_INTERVAL,
    QUIET_PERIOD,
};
