//! In-process leader election.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hub::{CoordinationError, LeaderElection, LeaderId, LeadershipLease, WebhookName};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
struct Held {
    holder: LeaderId,
    revoked: CancellationToken,
}

/// Mutual exclusion between tailers in one process.
///
/// Each [`acquire`](LeaderElection::acquire) waits until no other lease for
/// the webhook is outstanding. [`revoke`](Self::revoke) simulates the loss a
/// real coordinator reports when a session expires.
#[derive(Debug, Default)]
pub struct LocalLeaderElection {
    held: Mutex<HashMap<WebhookName, Held>>,
    changed: Notify,
    unavailable: AtomicBool,
}

impl LocalLeaderElection {
    /// Creates an election with no outstanding leases.
    pub fn new() -> Self {
        Self::default()
    }

    /// While `true`, [`acquire`](LeaderElection::acquire) fails with
    /// [`CoordinationError::Unavailable`] the way a disconnected coordinator
    /// would. Waiting contenders fail on their next wake-up.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// Returns `true` if some lease for `webhook` is outstanding.
    pub fn is_held(&self, webhook: &WebhookName) -> bool {
        self.held.lock().contains_key(webhook)
    }

    /// Returns the current holder of `webhook`, if any.
    pub fn holder(&self, webhook: &WebhookName) -> Option<LeaderId> {
        self.held.lock().get(webhook).map(|held| held.holder)
    }

    /// Takes leadership of `webhook` away from its holder.
    ///
    /// Returns `false` if nobody held it.
    pub fn revoke(&self, webhook: &WebhookName) -> bool {
        let removed = self.held.lock().remove(webhook);
        match removed {
            Some(held) => {
                info!(%webhook, holder = %held.holder, "leadership revoked");
                held.revoked.cancel();
                self.changed.notify_waiters();
                true
            }
            None => false,
        }
    }

    fn try_take(&self, webhook: &WebhookName) -> Option<LeadershipLease> {
        let mut held = self.held.lock();
        if held.contains_key(webhook) {
            return None;
        }
        let holder = LeaderId::new_random();
        let revoked = CancellationToken::new();
        held.insert(
            webhook.clone(),
            Held {
                holder,
                revoked: revoked.clone(),
            },
        );
        Some(LeadershipLease::new(webhook.clone(), holder, revoked))
    }
}

#[async_trait]
impl LeaderElection for LocalLeaderElection {
    async fn acquire(&self, webhook: &WebhookName) -> Result<LeadershipLease, CoordinationError> {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if self.unavailable.load(Ordering::SeqCst) {
                return Err(CoordinationError::Unavailable {
                    webhook: webhook.clone(),
                    message: "coordinator disconnected".to_string(),
                });
            }
            if let Some(lease) = self.try_take(webhook) {
                debug!(%webhook, holder = %lease.holder(), "leadership granted");
                return Ok(lease);
            }
            changed.await;
        }
    }

    async fn release(&self, lease: LeadershipLease) -> Result<(), CoordinationError> {
        let mut held = self.held.lock();
        if held
            .get(lease.webhook())
            .is_some_and(|current| current.holder == lease.holder())
        {
            if let Some(current) = held.remove(lease.webhook()) {
                current.revoked.cancel();
            }
            drop(held);
            debug!(webhook = %lease.webhook(), holder = %lease.holder(), "leadership released");
            self.changed.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn name() -> WebhookName {
        WebhookName::new("audit").unwrap()
    }

    #[tokio::test]
    async fn second_contender_waits_for_release() {
        let election = Arc::new(LocalLeaderElection::new());
        let first = election.acquire(&name()).await.unwrap();

        let contender = {
            let election = election.clone();
            tokio::spawn(async move { election.acquire(&name()).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        election.release(first.clone()).await.unwrap();
        let second = contender.await.unwrap();
        assert_ne!(second.holder(), first.holder());
        assert!(!first.is_held());
        assert!(second.is_held());
        assert_eq!(election.holder(&name()), Some(second.holder()));
    }

    #[tokio::test]
    async fn revoke_signals_the_holder() {
        let election = LocalLeaderElection::new();
        let lease = election.acquire(&name()).await.unwrap();
        assert!(election.revoke(&name()));
        tokio::time::timeout(Duration::from_secs(1), lease.lost())
            .await
            .unwrap();
        assert!(!election.is_held(&name()));
        assert!(!election.revoke(&name()));
    }

    #[tokio::test]
    async fn releasing_a_revoked_lease_leaves_the_new_holder_alone() {
        let election = LocalLeaderElection::new();
        let stale = election.acquire(&name()).await.unwrap();
        election.revoke(&name());
        let current = election.acquire(&name()).await.unwrap();

        election.release(stale).await.unwrap();
        assert!(current.is_held());
        assert_eq!(election.holder(&name()), Some(current.holder()));
    }

    #[tokio::test]
    async fn unavailable_coordinator_fails_waiting_contenders() {
        let election = Arc::new(LocalLeaderElection::new());
        let _held = election.acquire(&name()).await.unwrap();
        let contender = {
            let election = election.clone();
            tokio::spawn(async move { election.acquire(&name()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        election.set_unavailable(true);
        let result = tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(CoordinationError::Unavailable { .. })));

        election.set_unavailable(false);
        let other = WebhookName::new("billing").unwrap();
        assert!(election.acquire(&other).await.is_ok());
    }

    #[tokio::test]
    async fn webhooks_are_independent() {
        let election = LocalLeaderElection::new();
        let _a = election.acquire(&name()).await.unwrap();
        let other = WebhookName::new("billing").unwrap();
        let b = tokio::time::timeout(Duration::from_secs(1), election.acquire(&other))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.webhook(), &other);
    }
}
