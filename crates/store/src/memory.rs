//! In-process content store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub::{
    ChannelConfig, ChannelName, Clock, ContentKey, ContentPath, ContentStore, StoreError,
    TimeQuery,
};
use parking_lot::RwLock;
use tracing::trace;

#[derive(Debug)]
struct Channel {
    config: ChannelConfig,
    keys: BTreeSet<ContentKey>,
}

/// Channels held in memory. Cheap to share behind an `Arc`.
pub struct MemoryContentStore {
    clock: Arc<dyn Clock>,
    channels: RwLock<BTreeMap<ChannelName, Channel>>,
    failing: AtomicBool,
}

impl MemoryContentStore {
    /// Creates an empty store whose stability boundary follows `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            channels: RwLock::new(BTreeMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Creates a channel, or replaces the configuration of an existing one.
    pub fn create_channel(&self, config: ChannelConfig) {
        let mut channels = self.channels.write();
        match channels.get_mut(&config.name) {
            Some(channel) => channel.config = config,
            None => {
                channels.insert(
                    config.name.clone(),
                    Channel {
                        config,
                        keys: BTreeSet::new(),
                    },
                );
            }
        }
    }

    /// Returns the names of all channels.
    pub fn channels(&self) -> Vec<ChannelName> {
        self.channels.read().keys().cloned().collect()
    }

    /// Adds an item written at `time` and returns its generated key.
    pub fn insert_at(
        &self,
        channel: &ChannelName,
        time: DateTime<Utc>,
    ) -> Result<ContentKey, StoreError> {
        let key = ContentKey::generate(time);
        self.insert_key(channel, key.clone())?;
        Ok(key)
    }

    /// Adds an item written now and returns its key.
    pub fn insert(&self, channel: &ChannelName) -> Result<ContentKey, StoreError> {
        self.insert_at(channel, self.clock.now())
    }

    /// Adds an item with an explicit key.
    pub fn insert_key(&self, channel: &ChannelName, key: ContentKey) -> Result<(), StoreError> {
        let mut channels = self.channels.write();
        let entry = channels
            .get_mut(channel)
            .ok_or_else(|| StoreError::UnknownChannel {
                channel: channel.clone(),
            })?;
        trace!(%channel, %key, "inserted");
        entry.keys.insert(key);
        Ok(())
    }

    /// Makes every subsequent time query fail. For exercising error paths.
    pub fn fail_queries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn query_by_time(&self, query: &TimeQuery) -> Result<BTreeSet<ContentKey>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                channel: query.channel.clone(),
                message: "queries disabled".into(),
            });
        }
        let now = self.clock.now();
        let (start, end) = query.bounds();
        let channels = self.channels.read();
        let channel = channels
            .get(&query.channel)
            .ok_or_else(|| StoreError::UnknownChannel {
                channel: query.channel.clone(),
            })?;
        Ok(channel
            .keys
            .iter()
            .filter(|key| key.time() >= start && key.time() < end)
            .filter(|key| !query.stable_only || crate::is_stable(key, now))
            .cloned()
            .collect())
    }

    async fn last_updated(
        &self,
        channel: &ChannelName,
        default: ContentPath,
    ) -> Result<ContentPath, StoreError> {
        let channels = self.channels.read();
        let entry = channels
            .get(channel)
            .ok_or_else(|| StoreError::UnknownChannel {
                channel: channel.clone(),
            })?;
        Ok(entry
            .keys
            .last()
            .map_or(default, |key| ContentPath::Key(key.clone())))
    }

    async fn channel_config(&self, channel: &ChannelName) -> Result<ChannelConfig, StoreError> {
        self.channels
            .read()
            .get(channel)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| StoreError::UnknownChannel {
                channel: channel.clone(),
            })
    }
}
