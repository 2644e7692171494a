//! Leadership-gated lifecycle of one webhook's tailer.
//!
//! A [`WebhookLeader`] competes for the webhook's lease and, while it holds
//! it, runs one delivery cycle: read the cursor, start the scheduler, and
//! dispatch windows until the cycle stops. When the cycle ends it releases
//! the lease and, unless told to exit, competes again.
//!
//! ```text
//!  acquire ──► cycle ──► release ──┐
//!     ▲                            │
//!     └──── (backoff on failure) ◄─┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hub::{
    CallbackClient, Clock, ContentPath, ContentStore, CursorError, CursorStore, LeaderElection,
    LeadershipLease, TimeWindow, Webhook,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::queue::{delivery_queue, Polled, DEFAULT_POLL_TIMEOUT};
use crate::{CallbackDispatcher, CycleSignal, RetryPolicy, StopReason, TailError, TailingScheduler};

/// The adapters a tailer runs against.
#[derive(Clone)]
pub struct Services {
    /// Source of channel content and channel configuration.
    pub store: Arc<dyn ContentStore>,
    /// Durable last-completed positions.
    pub cursors: Arc<dyn CursorStore>,
    /// Cluster-wide mutual exclusion per webhook.
    pub election: Arc<dyn LeaderElection>,
    /// Delivers payloads to callback URLs.
    pub client: Arc<dyn CallbackClient>,
    /// Wall clock used for stability decisions.
    pub clock: Arc<dyn Clock>,
}

/// Tunables shared by every tailer.
#[derive(Debug, Clone)]
pub struct TailerSettings {
    /// How long the dispatch loop waits for a window before logging idleness.
    pub poll_timeout: Duration,
    /// Backoff for transactional callbacks.
    pub retry: RetryPolicy,
    /// Wait before competing again after a failed cycle.
    pub supervision_backoff: Duration,
}

impl Default for TailerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            retry: RetryPolicy::DEFAULT,
            supervision_backoff: Duration::from_secs(10),
        }
    }
}

/// Handle to a running webhook tailer.
pub struct WebhookLeader {
    webhook: Arc<Webhook>,
    cursors: Arc<dyn CursorStore>,
    stop: CancellationToken,
    leading: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WebhookLeader {
    /// Starts competing for `webhook`'s lease in the background.
    pub fn start(webhook: Webhook, services: Services, settings: TailerSettings) -> Self {
        let webhook = Arc::new(webhook);
        let stop = CancellationToken::new();
        let leading = Arc::new(AtomicBool::new(false));
        let span = info_span!("webhook", name = %webhook.name, channel = %webhook.channel);
        let cursors = services.cursors.clone();
        let task = tokio::spawn(
            supervise(
                webhook.clone(),
                services,
                settings,
                stop.clone(),
                leading.clone(),
            )
            .instrument(span),
        );
        Self {
            webhook,
            cursors,
            stop,
            leading,
            task,
        }
    }

    /// Returns the definition this tailer runs.
    pub fn webhook(&self) -> &Webhook {
        &self.webhook
    }

    /// Returns `true` while this process holds the lease and is delivering.
    pub fn is_leading(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }

    /// Returns the last delivered position, if any.
    pub async fn last_completed(&self) -> Result<Option<ContentPath>, CursorError> {
        self.cursors.peek(&self.webhook.name).await
    }

    /// Stops the tailer and waits for it to release the lease.
    ///
    /// The cursor is kept, so a later start resumes where this one stopped.
    pub async fn exit(self) {
        self.stop.cancel();
        if let Err(error) = self.task.await {
            warn!(webhook = %self.webhook.name, %error, "tailer task ended abnormally");
        }
    }

    /// Stops the tailer and deletes its cursor.
    pub async fn delete(self) -> Result<(), CursorError> {
        let cursors = self.cursors.clone();
        let name = self.webhook.name.clone();
        self.exit().await;
        cursors.delete(&name).await?;
        info!(webhook = %name, "cursor deleted");
        Ok(())
    }
}

async fn supervise(
    webhook: Arc<Webhook>,
    services: Services,
    settings: TailerSettings,
    stop: CancellationToken,
    leading: Arc<AtomicBool>,
) {
    while !stop.is_cancelled() {
        let acquired = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            acquired = services.election.acquire(&webhook.name) => acquired,
        };
        let lease = match acquired {
            Ok(lease) => lease,
            Err(error) => {
                warn!(%error, "unable to compete for leadership");
                if !backoff(&stop, settings.supervision_backoff).await {
                    break;
                }
                continue;
            }
        };

        info!(holder = %lease.holder(), "took leadership");
        leading.store(true, Ordering::SeqCst);
        let reason = run_cycle(&webhook, &services, &settings, &lease, &stop).await;
        leading.store(false, Ordering::SeqCst);
        if let Err(error) = services.election.release(lease).await {
            warn!(%error, "unable to release leadership");
        }

        match reason {
            StopReason::Stopped => info!("tailer stopped"),
            StopReason::LostLeadership => info!("lost leadership; competing again"),
            StopReason::Failed(reason) => {
                error!(%reason, "delivery cycle failed");
                if !backoff(&stop, settings.supervision_backoff).await {
                    break;
                }
            }
        }
    }
    debug!("supervisor exited");
}

/// Sleeps for `delay`. Returns `false` if stopped first.
async fn backoff(stop: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = stop.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

/// Runs one leadership cycle and returns why it ended.
async fn run_cycle(
    webhook: &Arc<Webhook>,
    services: &Services,
    settings: &TailerSettings,
    lease: &LeadershipLease,
    stop: &CancellationToken,
) -> StopReason {
    let signal = CycleSignal::new();
    let watcher = {
        let signal = signal.clone();
        let lease = lease.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = lease.lost() => signal.stop(StopReason::LostLeadership),
                () = stop.cancelled() => signal.stop(StopReason::Stopped),
                () = signal.stopped() => {}
            }
        })
    };

    let reason = match deliver(webhook, services, settings, &signal).await {
        Ok(reason) => reason,
        Err(error) => StopReason::Failed(error.to_string()),
    };
    signal.stop(reason.clone());
    if let Err(error) = watcher.await {
        warn!(%error, "leadership watcher ended abnormally");
    }
    reason
}

async fn deliver(
    webhook: &Arc<Webhook>,
    services: &Services,
    settings: &TailerSettings,
    signal: &CycleSignal,
) -> Result<StopReason, TailError> {
    let default = match &webhook.starting_key {
        Some(key) => ContentPath::Key(key.clone()),
        None => TimeWindow::empty(webhook.granularity, services.clock.now()).into(),
    };
    let start = services.cursors.get(&webhook.name, default).await?;
    info!(start = %start, "starting delivery cycle");

    let (queue, mut receiver) = delivery_queue(webhook.queue_capacity(), settings.poll_timeout);
    let scheduler = TailingScheduler::new(
        webhook.clone(),
        services.store.clone(),
        services.clock.clone(),
        start,
    );
    let scheduler_task = tokio::spawn(
        scheduler
            .run(queue, signal.clone())
            .instrument(info_span!("scheduler")),
    );
    let mut dispatcher = CallbackDispatcher::new(
        webhook.clone(),
        services.client.clone(),
        services.cursors.clone(),
        settings.retry,
    );

    let outcome = loop {
        match receiver.poll(signal).await {
            Ok(Polled::Path(path)) => {
                if let Err(error) = dispatcher.dispatch(path, signal).await {
                    break Err(TailError::from(error));
                }
            }
            Ok(Polled::Idle) => debug!("no new windows"),
            Ok(Polled::Stopped(reason)) => break Ok(reason),
            Err(error) => break Err(error),
        }
    };

    signal.stop(match &outcome {
        Ok(reason) => reason.clone(),
        Err(error) => StopReason::Failed(error.to_string()),
    });
    let dropped = receiver.discard();
    if dropped > 0 {
        debug!(dropped, "discarded queued windows");
    }
    dispatcher.shutdown().await;
    if let Err(error) = scheduler_task.await {
        warn!(%error, "scheduler task ended abnormally");
    }
    outcome
}
