//! Port traits: what the delivery engine needs from the outside world.
//!
//! The engine in the `webhook` crate depends only on these traits.
//! Infrastructure crates supply the implementations:
//!
//! | Port | Reference adapters |
//! |------|--------------------|
//! | [`ContentStore`] | `store::MemoryContentStore`, `store::FileContentStore` |
//! | [`CursorStore`] | `cluster::MemoryCursorStore`, `cluster::FileCursorStore` |
//! | [`LeaderElection`] | `cluster::LocalLeaderElection` |
//! | [`CallbackClient`] | `callback::HttpCallbackClient` |

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    CallbackError, ChannelConfig, ChannelName, ContentKey, ContentPath, CoordinationError,
    CursorError, LeaderId, StoreError, TimeQuery, WebhookName,
};

// ---------------------------------------------------------------------------
// Content store
// ---------------------------------------------------------------------------

/// Read access to channel content, by time bucket.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Returns every key in the bucket described by `query`, in ascending
    /// order.
    ///
    /// Must be idempotent. With `stable_only` set, must not return keys from
    /// regions that may still receive writes.
    async fn query_by_time(&self, query: &TimeQuery) -> Result<BTreeSet<ContentKey>, StoreError>;

    /// Returns the latest position written to `channel`, or `default` if the
    /// channel is empty.
    ///
    /// Used only to cap the stable boundary of non-live channels.
    async fn last_updated(
        &self,
        channel: &ChannelName,
        default: ContentPath,
    ) -> Result<ContentPath, StoreError>;

    /// Returns the configuration of `channel`.
    async fn channel_config(&self, channel: &ChannelName) -> Result<ChannelConfig, StoreError>;
}

// ---------------------------------------------------------------------------
// Cursor store
// ---------------------------------------------------------------------------

/// Durable record of the last position delivered per webhook.
///
/// Implementations must be strongly consistent from the leader's point of
/// view: a new leader observes the last value written by the previous one.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Returns the cursor, first storing `default` if none exists.
    async fn get(&self, webhook: &WebhookName, default: ContentPath)
        -> Result<ContentPath, CursorError>;

    /// Returns the cursor without creating it.
    async fn peek(&self, webhook: &WebhookName) -> Result<Option<ContentPath>, CursorError>;

    /// Records `path` as delivered.
    async fn set(&self, webhook: &WebhookName, path: &ContentPath) -> Result<(), CursorError>;

    /// Removes the cursor.
    async fn delete(&self, webhook: &WebhookName) -> Result<(), CursorError>;
}

// ---------------------------------------------------------------------------
// Leader election
// ---------------------------------------------------------------------------

/// Proof that this process currently leads a webhook.
///
/// The lease does not end when dropped; hand it back through
/// [`LeaderElection::release`]. The coordinator cancels the lease's token when
/// leadership is lost for any reason, and tailers must stop promptly when
/// that happens.
#[derive(Debug, Clone)]
pub struct LeadershipLease {
    webhook: WebhookName,
    holder: LeaderId,
    revoked: CancellationToken,
}

impl LeadershipLease {
    /// Creates a lease. `revoked` is cancelled by the coordinator on loss.
    pub fn new(webhook: WebhookName, holder: LeaderId, revoked: CancellationToken) -> Self {
        Self {
            webhook,
            holder,
            revoked,
        }
    }

    /// Returns the webhook this lease is for.
    pub fn webhook(&self) -> &WebhookName {
        &self.webhook
    }

    /// Returns the holder identity.
    pub fn holder(&self) -> LeaderId {
        self.holder
    }

    /// Returns `true` while leadership is still held.
    pub fn is_held(&self) -> bool {
        !self.revoked.is_cancelled()
    }

    /// Completes when leadership is lost.
    pub async fn lost(&self) {
        self.revoked.cancelled().await;
    }
}

/// Cluster-wide mutual exclusion per webhook.
///
/// At most one process holds a given webhook's lease at any instant. Failure
/// detection and failover timing belong to the coordination backend.
#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// Registers interest in `webhook` and waits until this process leads it.
    async fn acquire(&self, webhook: &WebhookName) -> Result<LeadershipLease, CoordinationError>;

    /// Relinquishes a lease. Releasing a lease that was already lost is a no-op.
    async fn release(&self, lease: LeadershipLease) -> Result<(), CoordinationError>;
}

// ---------------------------------------------------------------------------
// Callback client
// ---------------------------------------------------------------------------

/// The status line of a callback response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackResponse {
    /// HTTP status code.
    pub status: u16,
}

impl CallbackResponse {
    /// Only `200 OK` acknowledges a delivery.
    pub fn is_acknowledged(self) -> bool {
        self.status == 200
    }
}

/// Issues one callback request.
#[async_trait]
pub trait CallbackClient: Send + Sync {
    /// POSTs `body` as JSON to `url` and returns the response status.
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<CallbackResponse, CallbackError>;
}
