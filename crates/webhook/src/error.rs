//! Errors that end a delivery cycle.
//!
//! Transient callback failures never appear here: the dispatcher retries
//! them in place. Leadership loss and explicit stops are not errors either;
//! they surface as a [`crate::StopReason`].

use hub::CursorError;
use thiserror::Error;

/// A condition that aborts the current leadership cycle.
#[derive(Debug, Error)]
pub enum TailError {
    /// The tailing scheduler stopped because of an error.
    ///
    /// Reported by the delivery queue instead of "nothing new", so a broken
    /// tailer is never mistaken for an idle one.
    #[error("tailing scheduler failed: {reason}")]
    SchedulerFailed {
        /// Description of the scheduler's error.
        reason: String,
    },

    /// The cursor could not be read or written.
    #[error(transparent)]
    Cursor(#[from] CursorError),
}
