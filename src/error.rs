//! Error types for Quiesce
//!
//! Uses `thiserror` for library errors; the binary wraps these in `anyhow`.

use thiserror::Error;

/// Result type alias for wait operations
pub type WaitResult<T> = Result<T, WaitError>;

/// Boxed cause delivered by a watch session's error callback
pub type WatchCause = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for wait operations
#[derive(Error, Debug)]
pub enum WaitError {
    /// The watch session reported a failure while the wait was in progress
    #[error("file watch failed: {source}")]
    WatchFailed {
        #[source]
        source: WatchCause,
    },

    /// The watch session could not be established
    #[error("failed to start watching: {0}")]
    WatchSetup(#[from] notify::Error),

    /// IO error (worker spawn, control stream)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WaitError {
    /// Wrap a cause reported by a watch session's error callback
    pub fn watch_failed(cause: impl Into<WatchCause>) -> Self {
        WaitError::WatchFailed {
            source: cause.into(),
        }
    }
}
