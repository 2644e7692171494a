//! Delivers queued windows to the callback and advances the cursor.

use std::sync::Arc;

use hub::{CallbackClient, ContentPath, CursorError, CursorStore, DeliveryMode, Webhook};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{CallbackPayload, CycleSignal, RetryOutcome, RetryPolicy};

/// Result of dispatching one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Acknowledged and recorded in the cursor.
    Delivered {
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Fire-and-forget calls issued and the cursor advanced.
    Issued {
        /// One call per key.
        calls: usize,
    },
    /// The cycle stopped first; the cursor was not touched.
    Interrupted,
}

/// Consumer side of a delivery cycle.
pub struct CallbackDispatcher {
    webhook: Arc<Webhook>,
    client: Arc<dyn CallbackClient>,
    cursors: Arc<dyn CursorStore>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    in_flight: JoinSet<()>,
}

impl CallbackDispatcher {
    /// Creates a dispatcher allowing `webhook.parallel_calls` concurrent
    /// fire-and-forget calls.
    pub fn new(
        webhook: Arc<Webhook>,
        client: Arc<dyn CallbackClient>,
        cursors: Arc<dyn CursorStore>,
        retry: RetryPolicy,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(webhook.parallel_calls.max(1)));
        Self {
            webhook,
            client,
            cursors,
            retry,
            permits,
            in_flight: JoinSet::new(),
        }
    }

    /// Delivers `path` according to the webhook's mode.
    ///
    /// Cursor write failures end the cycle; callback failures never do.
    pub async fn dispatch(
        &mut self,
        path: ContentPath,
        signal: &CycleSignal,
    ) -> Result<Dispatched, CursorError> {
        match self.webhook.mode {
            DeliveryMode::Transactional => self.deliver(path, signal).await,
            DeliveryMode::FireAndForget => self.issue(path, signal).await,
        }
    }

    async fn deliver(
        &self,
        path: ContentPath,
        signal: &CycleSignal,
    ) -> Result<Dispatched, CursorError> {
        let payload = CallbackPayload::new(&self.webhook, &path).to_json();
        let body = &payload;
        let url = self.webhook.callback_url.as_str();
        let client = self.client.as_ref();
        debug!(path = %path, "delivering");

        let outcome = self
            .retry
            .run(signal, |attempt| {
                debug!(attempt, url, "calling back");
                client.post(url, body)
            })
            .await;

        match outcome {
            RetryOutcome::Acknowledged { attempts, .. } => {
                self.cursors.set(&self.webhook.name, &path).await?;
                debug!(path = %path, attempts, "delivered");
                Ok(Dispatched::Delivered { attempts })
            }
            RetryOutcome::Interrupted { attempts, .. } => {
                info!(path = %path, attempts, "delivery interrupted; cursor left unchanged");
                Ok(Dispatched::Interrupted)
            }
        }
    }

    async fn issue(
        &mut self,
        path: ContentPath,
        signal: &CycleSignal,
    ) -> Result<Dispatched, CursorError> {
        while self.in_flight.try_join_next().is_some() {}

        let mut calls = 0;
        for key in path.keys() {
            let permit = tokio::select! {
                biased;
                () = signal.stopped() => return Ok(Dispatched::Interrupted),
                permit = self.permits.clone().acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                return Ok(Dispatched::Interrupted);
            };

            let body = CallbackPayload::new(&self.webhook, &ContentPath::Key(key.clone())).to_json();
            let client = self.client.clone();
            let url = self.webhook.callback_url.clone();
            let key = key.to_string();
            self.in_flight.spawn(async move {
                let _permit = permit;
                match client.post(&url, &body).await {
                    Ok(response) if response.is_acknowledged() => debug!(%key, "called back"),
                    Ok(response) => {
                        warn!(%key, status = response.status, "callback not acknowledged; not retried")
                    }
                    Err(error) => warn!(%key, %error, "callback failed; not retried"),
                }
            });
            calls += 1;
        }

        self.cursors.set(&self.webhook.name, &path).await?;
        debug!(path = %path, calls, "issued");
        Ok(Dispatched::Issued { calls })
    }

    /// Aborts outstanding fire-and-forget calls.
    pub async fn shutdown(&mut self) {
        let outstanding = self.in_flight.len();
        if outstanding > 0 {
            debug!(outstanding, "aborting in-flight callbacks");
        }
        self.in_flight.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};
    use cluster::MemoryCursorStore;
    use hub::{
        CallbackError, CallbackResponse, ChannelName, ContentKey, Granularity, TimeWindow,
        WebhookName,
    };
    use parking_lot::Mutex;

    use crate::StopReason;

    /// Replays scripted statuses and records when each call arrived.
    struct ScriptedClient {
        statuses: Mutex<VecDeque<u16>>,
        calls: Mutex<Vec<(tokio::time::Instant, serde_json::Value)>>,
    }

    impl ScriptedClient {
        fn new(statuses: impl IntoIterator<Item = u16>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl CallbackClient for ScriptedClient {
        async fn post(
            &self,
            _url: &str,
            body: &serde_json::Value,
        ) -> Result<CallbackResponse, CallbackError> {
            self.calls
                .lock()
                .push((tokio::time::Instant::now(), body.clone()));
            let status = self.statuses.lock().pop_front().unwrap_or(500);
            Ok(CallbackResponse { status })
        }
    }

    fn webhook(mode: DeliveryMode) -> Arc<Webhook> {
        Arc::new(
            Webhook::new(
                WebhookName::new("audit").unwrap(),
                ChannelName::new("orders").unwrap(),
                "http://hub/channel/orders",
                "http://client/cb",
            )
            .with_mode(mode)
            .with_parallel_calls(2),
        )
    }

    fn window() -> ContentPath {
        let t = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        TimeWindow::new(
            Granularity::Second,
            t,
            [
                ContentKey::new(t, "a").unwrap(),
                ContentKey::new(t + TimeDelta::milliseconds(5), "b").unwrap(),
            ],
        )
        .into()
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_advances_only_after_acknowledgement() {
        let client = ScriptedClient::new([503, 503, 200]);
        let cursors = Arc::new(MemoryCursorStore::new());
        let hook = webhook(DeliveryMode::Transactional);
        let mut dispatcher =
            CallbackDispatcher::new(hook.clone(), client.clone(), cursors.clone(), RetryPolicy::DEFAULT);
        let signal = CycleSignal::new();

        let observer = {
            let cursors = cursors.clone();
            let name = hook.name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2_900)).await;
                cursors.peek(&name).await.unwrap()
            })
        };

        let started = tokio::time::Instant::now();
        let outcome = dispatcher.dispatch(window(), &signal).await.unwrap();
        assert_eq!(outcome, Dispatched::Delivered { attempts: 3 });

        let calls = client.calls.lock().clone();
        let offsets: Vec<_> = calls.iter().map(|(at, _)| *at - started).collect();
        assert_eq!(
            offsets,
            [Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]
        );
        assert!(calls.iter().all(|(_, body)| body["type"] == "items"));

        assert_eq!(observer.await.unwrap(), None);
        assert_eq!(cursors.peek(&hook.name).await.unwrap(), Some(window()));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_leadership_mid_backoff_keeps_the_cursor() {
        let client = ScriptedClient::new([]);
        let cursors = Arc::new(MemoryCursorStore::new());
        let hook = webhook(DeliveryMode::Transactional);
        let mut dispatcher =
            CallbackDispatcher::new(hook.clone(), client.clone(), cursors.clone(), RetryPolicy::DEFAULT);
        let signal = CycleSignal::new();
        let stopper = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            stopper.stop(StopReason::LostLeadership);
        });

        let outcome = dispatcher.dispatch(window(), &signal).await.unwrap();
        assert_eq!(outcome, Dispatched::Interrupted);
        assert_eq!(cursors.peek(&hook.name).await.unwrap(), None);
        // Calls at 0s, 1s and 3s; the 4s wait was cut short.
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn fire_and_forget_calls_once_per_key() {
        let client = ScriptedClient::new([500, 200]);
        let cursors = Arc::new(MemoryCursorStore::new());
        let hook = webhook(DeliveryMode::FireAndForget);
        let mut dispatcher =
            CallbackDispatcher::new(hook.clone(), client.clone(), cursors.clone(), RetryPolicy::DEFAULT);
        let signal = CycleSignal::new();

        let outcome = dispatcher.dispatch(window(), &signal).await.unwrap();
        assert_eq!(outcome, Dispatched::Issued { calls: 2 });
        assert_eq!(cursors.peek(&hook.name).await.unwrap(), Some(window()));

        while dispatcher.in_flight.join_next().await.is_some() {}
        let calls = client.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(_, body)| body["uris"].as_array().unwrap().len() == 1));
    }

    #[tokio::test]
    async fn heartbeat_is_posted_transactionally() {
        let client = ScriptedClient::new([200]);
        let cursors = Arc::new(MemoryCursorStore::new());
        let hook = webhook(DeliveryMode::Transactional);
        let mut dispatcher =
            CallbackDispatcher::new(hook.clone(), client.clone(), cursors.clone(), RetryPolicy::DEFAULT);
        let heartbeat: ContentPath = TimeWindow::empty(
            Granularity::Second,
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 9).unwrap(),
        )
        .into();

        dispatcher.dispatch(heartbeat.clone(), &CycleSignal::new()).await.unwrap();
        let calls = client.calls.lock().clone();
        assert_eq!(calls[0].1["type"], "heartbeat");
        assert_eq!(cursors.peek(&hook.name).await.unwrap(), Some(heartbeat));
    }
}
