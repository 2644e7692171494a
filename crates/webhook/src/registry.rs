//! The set of webhooks this process serves.

use std::collections::BTreeMap;

use hub::{ContentPath, CursorError, Webhook, WebhookError, WebhookName};
use tokio::sync::Mutex;
use tracing::info;

use crate::{Services, TailerSettings, WebhookLeader};

/// What [`WebhookRegistry::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// New webhook; a tailer was started.
    Created,
    /// Definition changed; the tailer was restarted from its cursor.
    Restarted,
    /// Identical definition; nothing happened.
    Unchanged,
    /// The webhook is paused; no tailer runs.
    Paused,
}

/// Point-in-time view of one webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookStatus {
    /// The registered definition.
    pub webhook: Webhook,
    /// Whether this process currently holds the webhook's lease.
    pub leading: bool,
    /// The cursor, or `None` if nothing was ever recorded.
    pub last_completed: Option<ContentPath>,
}

struct Entry {
    webhook: Webhook,
    leader: Option<WebhookLeader>,
}

/// Owns one [`WebhookLeader`] per active webhook.
pub struct WebhookRegistry {
    services: Services,
    settings: TailerSettings,
    entries: Mutex<BTreeMap<WebhookName, Entry>>,
}

impl WebhookRegistry {
    /// Creates an empty registry. Tailers share `services` and `settings`.
    pub fn new(services: Services, settings: TailerSettings) -> Self {
        Self {
            services,
            settings,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates or updates a webhook.
    ///
    /// A changed definition stops the running tailer before starting the new
    /// one, so the two never deliver concurrently. Pausing stops the tailer
    /// and keeps the cursor.
    pub async fn upsert(&self, webhook: Webhook) -> Result<Upserted, WebhookError> {
        webhook.validate()?;
        let mut entries = self.entries.lock().await;

        let existed = match entries.remove(&webhook.name) {
            Some(entry) if entry.webhook == webhook => {
                entries.insert(webhook.name.clone(), entry);
                return Ok(Upserted::Unchanged);
            }
            Some(entry) => {
                if let Some(leader) = entry.leader {
                    leader.exit().await;
                }
                true
            }
            None => false,
        };

        let name = webhook.name.clone();
        let (leader, upserted) = if webhook.paused {
            info!(webhook = %name, "webhook paused");
            (None, Upserted::Paused)
        } else {
            let leader =
                WebhookLeader::start(webhook.clone(), self.services.clone(), self.settings.clone());
            let upserted = if existed {
                Upserted::Restarted
            } else {
                Upserted::Created
            };
            info!(webhook = %name, ?upserted, "webhook started");
            (Some(leader), upserted)
        };
        entries.insert(name, Entry { webhook, leader });
        Ok(upserted)
    }

    /// Stops a webhook and deletes its cursor. Returns `false` if unknown.
    pub async fn remove(&self, name: &WebhookName) -> Result<bool, CursorError> {
        let entry = self.entries.lock().await.remove(name);
        let Some(entry) = entry else {
            return Ok(false);
        };
        match entry.leader {
            Some(leader) => leader.delete().await?,
            None => self.services.cursors.delete(name).await?,
        }
        info!(webhook = %name, "webhook removed");
        Ok(true)
    }

    /// Returns the names of all registered webhooks.
    pub async fn names(&self) -> Vec<WebhookName> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Returns the status of a webhook, or `None` if unknown.
    pub async fn status(&self, name: &WebhookName) -> Result<Option<WebhookStatus>, CursorError> {
        let (webhook, leading) = {
            let entries = self.entries.lock().await;
            let Some(entry) = entries.get(name) else {
                return Ok(None);
            };
            let leading = entry.leader.as_ref().is_some_and(WebhookLeader::is_leading);
            (entry.webhook.clone(), leading)
        };
        let last_completed = self.services.cursors.peek(name).await?;
        Ok(Some(WebhookStatus {
            webhook,
            leading,
            last_completed,
        }))
    }

    /// Stops every tailer. Cursors are kept.
    pub async fn shutdown(&self) {
        let entries = std::mem::take(&mut *self.entries.lock().await);
        for (_, entry) in entries {
            if let Some(leader) = entry.leader {
                leader.exit().await;
            }
        }
        info!("all webhooks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use cluster::{LocalLeaderElection, MemoryCursorStore};
    use hub::{
        CallbackClient, CallbackError, CallbackResponse, ChannelConfig, ChannelName, CursorStore,
        ManualClock,
    };
    use store::MemoryContentStore;

    struct Accepting;

    #[async_trait]
    impl CallbackClient for Accepting {
        async fn post(
            &self,
            _url: &str,
            _body: &serde_json::Value,
        ) -> Result<CallbackResponse, CallbackError> {
            Ok(CallbackResponse { status: 200 })
        }
    }

    fn registry() -> (WebhookRegistry, Arc<MemoryCursorStore>, Arc<LocalLeaderElection>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryContentStore::new(clock.clone()));
        store.create_channel(ChannelConfig::live(ChannelName::new("orders").unwrap()));
        let cursors = Arc::new(MemoryCursorStore::new());
        let election = Arc::new(LocalLeaderElection::new());
        let services = Services {
            store,
            cursors: cursors.clone(),
            election: election.clone(),
            client: Arc::new(Accepting),
            clock,
        };
        (
            WebhookRegistry::new(services, TailerSettings::default()),
            cursors,
            election,
        )
    }

    fn webhook() -> Webhook {
        Webhook::new(
            WebhookName::new("audit").unwrap(),
            ChannelName::new("orders").unwrap(),
            "http://hub/channel/orders",
            "http://client/cb",
        )
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn upsert_is_idempotent_and_restarts_on_change() {
        let (registry, _, _) = registry();
        assert_eq!(registry.upsert(webhook()).await.unwrap(), Upserted::Created);
        assert_eq!(registry.upsert(webhook()).await.unwrap(), Upserted::Unchanged);

        let changed = Webhook {
            callback_url: "http://client/other".into(),
            ..webhook()
        };
        assert_eq!(registry.upsert(changed).await.unwrap(), Upserted::Restarted);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pausing_releases_leadership_and_keeps_the_cursor() {
        let (registry, cursors, election) = registry();
        let name = webhook().name;
        registry.upsert(webhook()).await.unwrap();
        settle().await;
        assert!(election.is_held(&name));
        let cursor = cursors.peek(&name).await.unwrap();
        assert!(cursor.is_some());

        let paused = Webhook {
            paused: true,
            ..webhook()
        };
        assert_eq!(registry.upsert(paused).await.unwrap(), Upserted::Paused);
        assert!(!election.is_held(&name));
        assert_eq!(cursors.peek(&name).await.unwrap(), cursor);

        let status = registry.status(&name).await.unwrap().unwrap();
        assert!(!status.leading);
        assert!(status.webhook.paused);
        assert_eq!(status.last_completed, cursor);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_deletes_the_cursor() {
        let (registry, cursors, _) = registry();
        let name = webhook().name;
        registry.upsert(webhook()).await.unwrap();
        settle().await;

        assert!(registry.remove(&name).await.unwrap());
        assert!(!registry.remove(&name).await.unwrap());
        assert_eq!(cursors.peek(&name).await.unwrap(), None);
        assert!(registry.names().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_definitions_are_rejected() {
        let (registry, _, _) = registry();
        let bad = Webhook {
            callback_url: "ftp://client".into(),
            ..webhook()
        };
        assert!(matches!(
            registry.upsert(bad).await,
            Err(WebhookError::InvalidCallbackUrl { .. })
        ));
        assert!(registry.status(&webhook().name).await.unwrap().is_none());
    }
}
