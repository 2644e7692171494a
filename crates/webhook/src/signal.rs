//! Cancellation for one delivery cycle.
//!
//! A [`CycleSignal`] is shared by the scheduler task and the dispatch loop of
//! a single leadership cycle. It carries two independent facts:
//!
//! - **stop**: the cycle must end (explicit stop, lost leadership, or a fatal
//!   error). Every blocking point selects on it.
//! - **failure**: the scheduler died. The scheduler stops producing, and the
//!   next poll of the delivery queue reports the failure instead of "nothing
//!   new". A failure alone does not interrupt a delivery already in progress.
//!
//! Both are set at most once; the first writer wins.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why a delivery cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The owner asked the tailer to stop (shutdown, pause, delete, change).
    Stopped,
    /// The leadership lease was revoked.
    LostLeadership,
    /// The cycle hit an error it cannot continue past.
    Failed(String),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::LostLeadership => f.write_str("lost leadership"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Shared stop and failure state of a delivery cycle. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CycleSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
    failure: Arc<OnceLock<String>>,
}

impl CycleSignal {
    /// Creates a live signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends the cycle. Only the first reason is kept.
    pub fn stop(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    /// Records a scheduler failure. Only the first failure is kept.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.failure.set(reason.into());
    }

    /// Returns `true` while the cycle may keep working.
    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Returns the stop reason once the cycle has been stopped.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.reason.get().cloned()
    }

    /// Returns the scheduler failure, if one was recorded.
    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    /// Completes when the cycle is stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}
