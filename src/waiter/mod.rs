//! Quiescence-aware change waiting for continuous builds
//!
//! After a build finishes, [`ChangeWaiter::wait`] blocks until:
//! - the watched file set stops changing for one quiet period (250ms),
//! - the shared [`CancellationToken`] is cancelled (Ctrl+C, or Ctrl-D /
//!   end-of-stream on the interactive input), or
//! - the watch session reports an error.
//!
//! The waiter decides *when* to stop waiting, never *what* changed or what
//! to rebuild.

mod cancel;
mod event;
mod idle;
mod input;
mod session;
mod wait;
#[cfg(test)]
mod tests;

use std::time::Duration;

pub use cancel::CancellationToken;
pub use event::LoopEvent;
pub use idle::IdleTimeout;
pub use input::{InputByte, InputSubscription, InteractiveInput, SubscriptionGuard};
pub use session::{
    ChangeEvent, ChangeHandler, ErrorHandler, FileSet, NotifySessionFactory, WatchSession,
    WatchSessionFactory,
};
pub use wait::ChangeWaiter;

/// How long the file set must stay unchanged before the wait settles.
/// An editor save-and-format burst fits inside one period.
pub const QUIET_PERIOD: Duration = Duration::from_millis(250);

/// How often the cancellation token is polled while waiting.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interactive abort key: ASCII 4, Ctrl-D. End-of-stream is treated the same.
pub const ABORT_KEY: u8 = 0x04;
