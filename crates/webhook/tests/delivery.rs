//! End-to-end delivery through the registry, with in-memory adapters and a
//! manual clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use cluster::{LocalLeaderElection, MemoryCursorStore};
use hub::{
    CallbackClient, CallbackError, CallbackResponse, ChannelConfig, ChannelName, ManualClock,
    Webhook, WebhookName,
};
use parking_lot::Mutex;
use store::MemoryContentStore;
use webhook::{Services, TailerSettings, Upserted, WebhookRegistry};

#[derive(Default)]
struct RecordingClient {
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingClient {
    fn ids_for(&self, url: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(called, _)| called == url)
            .map(|(_, body)| body["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn all_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|(_, body)| body["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl CallbackClient for RecordingClient {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<CallbackResponse, CallbackError> {
        self.calls.lock().push((url.to_string(), body.clone()));
        Ok(CallbackResponse { status: 200 })
    }
}

struct Cluster {
    clock: Arc<ManualClock>,
    store: Arc<MemoryContentStore>,
    cursors: Arc<MemoryCursorStore>,
    election: Arc<LocalLeaderElection>,
    client: Arc<RecordingClient>,
}

impl Cluster {
    fn new(now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(MemoryContentStore::new(clock.clone()));
        store.create_channel(ChannelConfig::live(orders()));
        Self {
            clock,
            store,
            cursors: Arc::new(MemoryCursorStore::new()),
            election: Arc::new(LocalLeaderElection::new()),
            client: Arc::new(RecordingClient::default()),
        }
    }

    /// A registry as one process of the cluster would build it.
    fn process(&self) -> WebhookRegistry {
        let services = Services {
            store: self.store.clone(),
            cursors: self.cursors.clone(),
            election: self.election.clone(),
            client: self.client.clone(),
            clock: self.clock.clone(),
        };
        WebhookRegistry::new(services, TailerSettings::default())
    }
}

fn orders() -> ChannelName {
    ChannelName::new("orders").unwrap()
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 5, 12, 0, 0).unwrap()
}

fn second_id(offset: i64) -> String {
    (start() + TimeDelta::seconds(offset))
        .format("%Y/%m/%d/%H/%M/%S")
        .to_string()
}

fn hook(callback_url: &str) -> Webhook {
    Webhook::new(
        WebhookName::new("orders-audit").unwrap(),
        orders(),
        "http://hub/channel/orders",
        callback_url,
    )
}

async fn leading(registry: &WebhookRegistry) -> bool {
    let name = WebhookName::new("orders-audit").unwrap();
    registry.status(&name).await.unwrap().unwrap().leading
}

async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn new_callback_url_receives_everything_after_the_cursor() {
    let cluster = Cluster::new(start());
    let registry = cluster.process();
    registry.upsert(hook("http://first/cb")).await.unwrap();
    settle().await;

    cluster.store.insert_at(&orders(), start() + TimeDelta::milliseconds(1_200)).unwrap();
    cluster.clock.set(start() + TimeDelta::seconds(2));
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(cluster.client.ids_for("http://first/cb"), [second_id(1)]);

    assert_eq!(
        registry.upsert(hook("http://second/cb")).await.unwrap(),
        Upserted::Restarted
    );
    settle().await;
    let moved = cluster
        .store
        .insert_at(&orders(), start() + TimeDelta::milliseconds(2_500))
        .unwrap();
    cluster.clock.set(start() + TimeDelta::seconds(4));
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(cluster.client.ids_for("http://first/cb"), [second_id(1)]);
    assert_eq!(
        cluster.client.ids_for("http://second/cb"),
        [second_id(2), second_id(3)]
    );
    let calls = cluster.client.calls.lock().clone();
    let carried = calls
        .iter()
        .find(|(_, body)| body["id"] == second_id(2))
        .map(|(_, body)| body["uris"][0].clone());
    assert_eq!(
        carried,
        Some(serde_json::Value::String(format!(
            "http://hub/channel/orders/{}",
            moved.to_url()
        )))
    );
    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failover_continues_without_gaps() {
    let cluster = Cluster::new(start());
    let first = cluster.process();
    let second = cluster.process();
    first.upsert(hook("http://cb")).await.unwrap();
    settle().await;
    second.upsert(hook("http://cb")).await.unwrap();
    settle().await;

    assert!(leading(&first).await);
    assert!(!leading(&second).await);

    cluster.clock.set(start() + TimeDelta::seconds(3));
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    first.shutdown().await;
    settle().await;
    assert!(leading(&second).await);

    cluster.clock.set(start() + TimeDelta::seconds(6));
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let ids = cluster.client.all_ids();
    let expected: Vec<_> = (1..=5).map(second_id).collect();
    assert_eq!(ids, expected);
    second.shutdown().await;
}
