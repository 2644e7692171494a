//! Bounded hand-off between the tailing scheduler and the dispatcher.
//!
//! Capacity is two windows per parallel call. A full queue blocks the
//! scheduler, which is the only back-pressure the engine applies. Both ends
//! give up as soon as the cycle stops.

use std::time::Duration;

use hub::ContentPath;
use tokio::sync::mpsc;

use crate::{CycleSignal, StopReason, TailError};

/// How long a poll waits for a window before reporting [`Polled::Idle`].
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Creates a queue holding at most `capacity` windows.
pub fn delivery_queue(capacity: usize, poll_timeout: Duration) -> (DeliverySender, DeliveryReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        DeliverySender { tx },
        DeliveryReceiver { rx, poll_timeout },
    )
}

/// The cycle stopped, or the receiver went away, while a window was waiting
/// to be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Producer half, owned by the scheduler.
#[derive(Debug)]
pub struct DeliverySender {
    tx: mpsc::Sender<ContentPath>,
}

impl DeliverySender {
    /// Queues `path`, waiting while the queue is full.
    pub async fn put(&self, path: ContentPath, signal: &CycleSignal) -> Result<(), Interrupted> {
        tokio::select! {
            biased;
            () = signal.stopped() => Err(Interrupted),
            sent = self.tx.send(path) => sent.map_err(|_| Interrupted),
        }
    }
}

/// Outcome of [`DeliveryReceiver::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// The next window to deliver.
    Path(ContentPath),
    /// Nothing arrived within the poll timeout; not an error.
    Idle,
    /// The cycle has ended.
    Stopped(StopReason),
}

/// Consumer half, owned by the dispatch loop.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::Receiver<ContentPath>,
    poll_timeout: Duration,
}

impl DeliveryReceiver {
    /// Waits for the next window.
    ///
    /// A recorded scheduler failure takes precedence over queued windows and
    /// is returned as [`TailError::SchedulerFailed`].
    pub async fn poll(&mut self, signal: &CycleSignal) -> Result<Polled, TailError> {
        if let Some(reason) = signal.failure() {
            return Err(TailError::SchedulerFailed {
                reason: reason.to_string(),
            });
        }
        if let Some(reason) = signal.stop_reason() {
            return Ok(Polled::Stopped(reason));
        }

        tokio::select! {
            biased;
            () = signal.stopped() => Ok(Polled::Stopped(
                signal.stop_reason().unwrap_or(StopReason::Stopped),
            )),
            received = tokio::time::timeout(self.poll_timeout, self.rx.recv()) => match received {
                Ok(Some(path)) => Ok(Polled::Path(path)),
                Ok(None) => Err(TailError::SchedulerFailed {
                    reason: signal
                        .failure()
                        .unwrap_or("scheduler exited unexpectedly")
                        .to_string(),
                }),
                Err(_) => match signal.failure() {
                    Some(reason) => Err(TailError::SchedulerFailed {
                        reason: reason.to_string(),
                    }),
                    None => Ok(Polled::Idle),
                },
            },
        }
    }

    /// Drops every queued window without delivering it.
    pub fn discard(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
