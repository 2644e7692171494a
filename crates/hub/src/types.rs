//! Shared value types for the hub domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! behaviour: [`Granularity`] knows how to bucket time, and [`Webhook`] knows
//! how to validate itself and size its delivery queue.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChannelName, ContentKey, WebhookError, WebhookName};

// ---------------------------------------------------------------------------
// Time buckets
// ---------------------------------------------------------------------------

/// Width of the time buckets a webhook delivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One-second windows, for low-latency delivery.
    #[default]
    Second,
    /// One-minute windows, for catching up or low-volume channels.
    Minute,
}

impl Granularity {
    /// Returns the bucket width.
    pub fn duration(self) -> TimeDelta {
        match self {
            Self::Second => TimeDelta::seconds(1),
            Self::Minute => TimeDelta::minutes(1),
        }
    }

    /// Returns the bucket width as a scheduler period.
    pub fn period(self) -> std::time::Duration {
        match self {
            Self::Second => std::time::Duration::from_secs(1),
            Self::Minute => std::time::Duration::from_secs(60),
        }
    }

    /// Truncates `time` to the start of its bucket.
    pub fn round_down(self, time: DateTime<Utc>) -> DateTime<Utc> {
        let unit = self.duration().num_milliseconds();
        let excess = time.timestamp_millis().rem_euclid(unit);
        let sub_millis = i64::from(time.timestamp_subsec_nanos() % 1_000_000);
        time - TimeDelta::milliseconds(excess) - TimeDelta::nanoseconds(sub_millis)
    }

    /// Renders the bucket containing `time` as `yyyy/MM/dd/HH/mm[/ss]`.
    pub fn format_bucket(self, time: DateTime<Utc>) -> String {
        match self {
            Self::Second => time.format("%Y/%m/%d/%H/%M/%S").to_string(),
            Self::Minute => time.format("%Y/%m/%d/%H/%M").to_string(),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Second => f.write_str("second"),
            Self::Minute => f.write_str("minute"),
        }
    }
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// How a webhook hands windows to its callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One POST per window, retried until acknowledged; windows strictly in order.
    #[default]
    Transactional,
    /// One POST per key, best effort, issued concurrently.
    FireAndForget,
}

fn default_parallel_calls() -> usize {
    1
}

/// A subscription delivering a channel's stable content to a callback URL.
///
/// A webhook is immutable for the duration of a delivery cycle. Changing any
/// field means restarting its tailer; the cursor carries progress across.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    /// Name; keys the cursor and the leadership node.
    pub name: WebhookName,

    /// Channel being tailed.
    pub channel: ChannelName,

    /// Public URL of the channel; prefixes every URI in a callback payload.
    pub channel_url: String,

    /// Where payloads are POSTed.
    pub callback_url: String,

    /// Window width.
    #[serde(default)]
    pub granularity: Granularity,

    /// Batch or per-item delivery.
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Maximum concurrent callbacks; also sizes the delivery queue.
    #[serde(default = "default_parallel_calls")]
    pub parallel_calls: usize,

    /// Allows switching from second to minute windows while far behind.
    #[serde(default)]
    pub fast_forward: bool,

    /// Position to start from when no cursor exists yet.
    #[serde(default)]
    pub starting_key: Option<ContentKey>,

    /// A paused webhook holds no leadership and delivers nothing.
    #[serde(default)]
    pub paused: bool,
}

impl Webhook {
    /// Creates a transactional, second-granular webhook with one parallel call.
    pub fn new(
        name: WebhookName,
        channel: ChannelName,
        channel_url: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            name,
            channel,
            channel_url: channel_url.into(),
            callback_url: callback_url.into(),
            granularity: Granularity::default(),
            mode: DeliveryMode::default(),
            parallel_calls: default_parallel_calls(),
            fast_forward: false,
            starting_key: None,
            paused: false,
        }
    }

    /// Sets the window granularity.
    #[must_use]
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Sets the delivery mode.
    #[must_use]
    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the parallelism limit.
    #[must_use]
    pub fn with_parallel_calls(mut self, parallel_calls: usize) -> Self {
        self.parallel_calls = parallel_calls;
        self
    }

    /// Marks the webhook as eligible for fast-forward.
    #[must_use]
    pub fn with_fast_forward(mut self, fast_forward: bool) -> Self {
        self.fast_forward = fast_forward;
        self
    }

    /// Sets the starting key used when no cursor exists.
    #[must_use]
    pub fn with_starting_key(mut self, key: ContentKey) -> Self {
        self.starting_key = Some(key);
        self
    }

    /// Checks the invariants a tailer relies on.
    pub fn validate(&self) -> Result<(), WebhookError> {
        let url = self.callback_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(WebhookError::InvalidCallbackUrl {
                name: self.name.clone(),
                url: self.callback_url.clone(),
            });
        }
        if self.parallel_calls == 0 {
            return Err(WebhookError::InvalidParallelism {
                name: self.name.clone(),
            });
        }
        if self.channel_url.trim().is_empty() {
            return Err(WebhookError::MissingChannelUrl {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Capacity of the delivery queue: two windows per parallel call.
    pub fn queue_capacity(&self) -> usize {
        self.parallel_calls.max(1) * 2
    }

    /// Returns the channel URL without a trailing slash.
    pub fn channel_base_url(&self) -> &str {
        self.channel_url.trim_end_matches('/')
    }
}

// ---------------------------------------------------------------------------
// Channels and queries
// ---------------------------------------------------------------------------

/// What the delivery engine needs to know about a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name.
    pub name: ChannelName,

    /// `false` for replicas, whose content lags their source.
    #[serde(default = "default_live")]
    pub live: bool,
}

fn default_live() -> bool {
    true
}

impl ChannelConfig {
    /// Creates the configuration of a live channel.
    pub fn live(name: ChannelName) -> Self {
        Self { name, live: true }
    }

    /// Creates the configuration of a replicating channel.
    pub fn replica(name: ChannelName) -> Self {
        Self { name, live: false }
    }
}

/// A request for every key in one time bucket of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeQuery {
    /// Channel to query.
    pub channel: ChannelName,
    /// Any instant inside the bucket; stores round it down.
    pub start: DateTime<Utc>,
    /// Bucket width.
    pub granularity: Granularity,
    /// Exclude keys from regions that may still change.
    pub stable_only: bool,
}

impl TimeQuery {
    /// Returns the half-open instant range `[start, end)` of the bucket.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.granularity.round_down(self.start);
        (start, start + self.granularity.duration())
    }
}
