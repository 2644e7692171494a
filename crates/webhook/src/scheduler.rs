//! Tailing scheduler: turns newly stable time buckets into delivery windows.
//!
//! One scheduler task runs per active webhook. On every tick it walks from
//! the last queued position up to the stable boundary, one bucket at a time,
//! and queues a window per bucket, empty or not. Queueing blocks while the
//! dispatcher is behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hub::{Clock, ContentPath, ContentStore, StoreError, TimeWindow, Webhook};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace};

use crate::queue::{DeliverySender, Interrupted};
use crate::{CycleSignal, WindowStrategy};

/// Why a tick ended early.
#[derive(Debug)]
pub(crate) enum TickError {
    /// The cycle stopped; not a failure.
    Interrupted,
    /// The content store failed; the scheduler must stop.
    Store(StoreError),
}

impl From<Interrupted> for TickError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

impl From<StoreError> for TickError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

/// Producer side of a delivery cycle.
pub struct TailingScheduler {
    webhook: Arc<Webhook>,
    store: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    strategy: WindowStrategy,
    last_added: ContentPath,
    live: bool,
}

impl TailingScheduler {
    /// Creates a scheduler that continues after `last_added`.
    pub fn new(
        webhook: Arc<Webhook>,
        store: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
        last_added: ContentPath,
    ) -> Self {
        let strategy = WindowStrategy::for_webhook(&webhook);
        Self {
            webhook,
            store,
            clock,
            strategy,
            last_added,
            live: true,
        }
    }

    /// Returns the current window strategy.
    pub fn strategy(&self) -> WindowStrategy {
        self.strategy
    }

    /// Returns the last position queued for delivery.
    pub fn last_added(&self) -> &ContentPath {
        &self.last_added
    }

    /// Ticks at the strategy's fixed rate until the cycle stops.
    ///
    /// A store failure is recorded on `signal` and ends the task; the
    /// dispatcher learns about it on its next poll.
    pub async fn run(mut self, queue: DeliverySender, signal: CycleSignal) {
        let channel = self.webhook.channel.clone();
        match self.store.channel_config(&channel).await {
            Ok(config) => self.live = config.live,
            Err(error) => {
                error!(%channel, %error, "unable to load channel configuration");
                signal.fail(error.to_string());
                return;
            }
        }

        let first_tick = Instant::now() + self.strategy.first_tick_delay(self.clock.now());
        let mut ticker = tokio::time::interval_at(first_tick, self.strategy.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            start = %self.last_added,
            granularity = %self.strategy.granularity(),
            live = self.live,
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                () = signal.stopped() => break,
                _ = ticker.tick() => {}
            }
            match self.tick(&queue, &signal).await {
                Ok(_) => {}
                Err(TickError::Interrupted) => break,
                Err(TickError::Store(error)) => {
                    error!(%channel, %error, "scheduler tick failed");
                    signal.fail(error.to_string());
                    break;
                }
            }
        }
        info!(last_added = %self.last_added, "scheduler stopped");
    }

    /// Queues every stable window after the last queued position.
    ///
    /// Returns the number of windows queued.
    pub(crate) async fn tick(
        &mut self,
        queue: &DeliverySender,
        signal: &CycleSignal,
    ) -> Result<usize, TickError> {
        if !signal.is_live() {
            return Err(TickError::Interrupted);
        }

        let replica = if self.live {
            None
        } else {
            let none = TimeWindow::empty(self.strategy.granularity(), DateTime::<Utc>::default());
            Some(
                self.store
                    .last_updated(&self.webhook.channel, none.into())
                    .await?,
            )
        };
        let now = self.clock.now();
        let mut stable = self.strategy.stable_with_replica(now, replica.as_ref());
        let mut next_time = self.strategy.next_time(&self.last_added);
        debug!(
            last_added = %self.last_added,
            %next_time,
            %stable,
            replica = ?replica.as_ref().map(ContentPath::time),
            "tick"
        );

        let mut queued = 0;
        while self.strategy.is_stable(next_time, stable) {
            if !signal.is_live() {
                return Err(TickError::Interrupted);
            }
            let query = self.strategy.query(&self.webhook.channel, next_time);
            let keys = self.store.query_by_time(&query).await?;
            let window = self.strategy.window(next_time, keys, &self.last_added);
            trace!(window = %window, "queueing window");

            queue.put(window.clone(), signal).await?;
            self.last_added = window;
            queued += 1;

            if self.strategy.fast_forward(self.last_added.time(), stable) {
                stable = self.strategy.stable_with_replica(now, replica.as_ref());
                info!(
                    last_added = %self.last_added,
                    %stable,
                    "fast-forwarding to minute windows"
                );
            }
            next_time = self.strategy.next_time(&self.last_added);
        }
        Ok(queued)
    }
}
