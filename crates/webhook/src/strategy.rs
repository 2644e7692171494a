//! Window strategy: which window to check next, and how far is stable.
//!
//! The two granularities differ in four derived values, each supplied by a
//! match arm below:
//!
//! | | Second | Minute |
//! |---|---|---|
//! | bucket | 1 s | 1 min |
//! | tick period | 1 s | 60 s |
//! | first tick delay | 0 | `(66 − second-of-minute) mod 60` s |
//! | stable | now | now − 1 min |
//!
//! "now" is truncated to whole seconds. A window is deliverable once its
//! bucket starts strictly before the stable instant.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use hub::{ChannelName, ContentKey, ContentPath, Granularity, TimeQuery, TimeWindow, Webhook};

/// Minutes behind stable after which a fast-forwardable webhook switches to
/// minute windows.
pub const FAST_FORWARD_THRESHOLD_MINUTES: i64 = 4;

/// Per-webhook window selection state.
///
/// Starts at the webhook's configured granularity. A fast-forwardable
/// second-granular strategy may switch itself to minute granularity; it
/// never switches back on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStrategy {
    granularity: Granularity,
    fast_forward: bool,
}

impl WindowStrategy {
    /// Creates the strategy for `webhook`.
    pub fn for_webhook(webhook: &Webhook) -> Self {
        Self::new(webhook.granularity, webhook.fast_forward)
    }

    /// Creates a strategy with an explicit granularity.
    pub fn new(granularity: Granularity, fast_forward: bool) -> Self {
        Self {
            granularity,
            fast_forward,
        }
    }

    /// Returns the current granularity.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Returns the scheduler tick period.
    pub fn period(&self) -> Duration {
        self.granularity.period()
    }

    /// Returns the delay before the first tick.
    ///
    /// Minute ticks are aligned a few seconds past the top of the minute, so
    /// each poll fires just after a minute window has fully elapsed.
    pub fn first_tick_delay(&self, now: DateTime<Utc>) -> Duration {
        match self.granularity {
            Granularity::Second => Duration::ZERO,
            Granularity::Minute => Duration::from_secs(u64::from((66 - now.second()) % 60)),
        }
    }

    /// Returns the wall-clock stable instant.
    pub fn stable(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = Granularity::Second.round_down(now);
        match self.granularity {
            Granularity::Second => now,
            Granularity::Minute => now - TimeDelta::minutes(1),
        }
    }

    /// Maps a replica's last-updated position to the latest instant that is
    /// safe to tail up to.
    ///
    /// Minute: a replica caught mid-minute may still backfill that minute, so
    /// a second-level position before second 59 (or a bare key) backs off a
    /// whole minute before rounding down. Second: the position's own second.
    pub fn replicating_stable(&self, last_updated: &ContentPath) -> DateTime<Utc> {
        let time = last_updated.time();
        match self.granularity {
            Granularity::Second => Granularity::Second.round_down(time),
            Granularity::Minute => {
                let mid_minute = match last_updated {
                    ContentPath::Key(_) => true,
                    ContentPath::Window(window) => {
                        window.granularity() == Granularity::Second && time.second() < 59
                    }
                };
                if mid_minute {
                    Granularity::Minute.round_down(time - TimeDelta::minutes(1))
                } else {
                    Granularity::Minute.round_down(time)
                }
            }
        }
    }

    /// Returns the stable instant, capped by a replica's progress when the
    /// channel is not live.
    pub fn stable_with_replica(
        &self,
        now: DateTime<Utc>,
        replica_last_updated: Option<&ContentPath>,
    ) -> DateTime<Utc> {
        let stable = self.stable(now);
        match replica_last_updated {
            Some(last_updated) => stable.min(self.replicating_stable(last_updated)),
            None => stable,
        }
    }

    /// Returns the time of the window after `last`.
    ///
    /// A window is complete, so the next one starts at its end. A point's
    /// unit may hold later keys, so it is checked again from the point itself.
    pub fn next_time(&self, last: &ContentPath) -> DateTime<Utc> {
        match last {
            ContentPath::Key(key) => key.time(),
            ContentPath::Window(window) => window.end(),
        }
    }

    /// Returns `true` if the bucket containing `time` may be delivered.
    pub fn is_stable(&self, time: DateTime<Utc>, stable: DateTime<Utc>) -> bool {
        self.granularity.round_down(time) < stable
    }

    /// Builds the store query for the bucket containing `time`.
    pub fn query(&self, channel: &ChannelName, time: DateTime<Utc>) -> TimeQuery {
        TimeQuery {
            channel: channel.clone(),
            start: time,
            granularity: self.granularity,
            stable_only: true,
        }
    }

    /// Builds the window at `time` from the keys that follow `last`.
    pub fn window(
        &self,
        time: DateTime<Utc>,
        keys: BTreeSet<ContentKey>,
        last: &ContentPath,
    ) -> ContentPath {
        let keys = keys.into_iter().filter(|key| last.precedes(key));
        TimeWindow::new(self.granularity, time, keys).into()
    }

    /// Returns `true` if a webhook delivered up to `last_time` should switch
    /// to minute windows.
    pub fn should_fast_forward(&self, last_time: DateTime<Utc>, stable: DateTime<Utc>) -> bool {
        self.fast_forward
            && self.granularity == Granularity::Second
            && stable - last_time > TimeDelta::minutes(FAST_FORWARD_THRESHOLD_MINUTES)
    }

    /// Switches to minute windows if [`Self::should_fast_forward`] says so.
    /// Returns `true` on a switch.
    pub fn fast_forward(&mut self, last_time: DateTime<Utc>, stable: DateTime<Utc>) -> bool {
        if self.should_fast_forward(last_time, stable) {
            self.granularity = Granularity::Minute;
            true
        } else {
            false
        }
    }
}
