//! Shared cancellation flag for the continuous build loop

use std::sync::atomic::{AtomicBool, Ordering};

/// Externally-settable cancellation flag.
///
/// Owned by the caller for the lifetime of the build loop and shared with
/// every `wait` call via `Arc`. The waiter only observes the flag; it never
/// clears it. Requesting cancellation more than once is a no-op past the
/// first.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancellation(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
