//! File-backed content store.
//!
//! Layout: `<root>/<channel>/yyyy/MM/dd/HH/mm/ss/<epochMillis>-<discriminator>`,
//! one file per item holding its raw bytes. A channel's configuration lives
//! in `<root>/<channel>/channel.json`; a channel directory without one is live.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use hub::{
    ChannelConfig, ChannelName, Clock, ContentKey, ContentPath, ContentStore, Granularity,
    StoreError, TimeQuery,
};
use tracing::{debug, trace};

const CONFIG_FILE: &str = "channel.json";

/// Hours [`FileContentStore`] scans back for a channel's latest item.
pub const DEFAULT_LOOK_BACK_HOURS: i64 = 24;

/// Content store over a directory tree.
pub struct FileContentStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    look_back: TimeDelta,
}

impl FileContentStore {
    /// Opens the store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            look_back: TimeDelta::hours(DEFAULT_LOOK_BACK_HOURS),
        }
    }

    /// Overrides the last-updated look-back.
    pub fn with_look_back(mut self, look_back: TimeDelta) -> Self {
        self.look_back = look_back;
        self
    }

    fn channel_dir(&self, channel: &ChannelName) -> PathBuf {
        self.root.join(channel.as_str())
    }

    fn bucket_dir(&self, channel: &ChannelName, url: &str) -> PathBuf {
        url.split('/')
            .fold(self.channel_dir(channel), |dir, segment| dir.join(segment))
    }

    /// Writes a channel's configuration, creating the channel if needed.
    pub async fn create_channel(&self, config: &ChannelConfig) -> Result<(), StoreError> {
        let dir = self.channel_dir(&config.name);
        tokio::fs::create_dir_all(&dir).await?;
        let json = serde_json::to_vec_pretty(config).map_err(|e| StoreError::Unavailable {
            channel: config.name.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::write(dir.join(CONFIG_FILE), json).await?;
        debug!(channel = %config.name, live = config.live, "channel created");
        Ok(())
    }

    /// Stores `content` as a new item written now and returns its key.
    pub async fn append(&self, channel: &ChannelName, content: &[u8]) -> Result<ContentKey, StoreError> {
        let key = ContentKey::generate(self.clock.now());
        let path = self.bucket_dir(channel, &key.to_url());
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.channel_dir(channel));
        tokio::fs::create_dir_all(&dir).await?;

        let staging = dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &path).await?;
        trace!(%channel, %key, bytes = content.len(), "appended");
        Ok(key)
    }

    /// Reads the bytes stored under `key`.
    pub async fn read(&self, channel: &ChannelName, key: &ContentKey) -> Result<Vec<u8>, StoreError> {
        Ok(tokio::fs::read(self.bucket_dir(channel, &key.to_url())).await?)
    }

    /// Returns the greatest key in the hour containing `hour`.
    async fn latest_in_hour(
        &self,
        channel: &ChannelName,
        hour: DateTime<Utc>,
    ) -> Result<Option<ContentKey>, StoreError> {
        let hour_dir = self.bucket_dir(channel, &hour.format("%Y/%m/%d/%H").to_string());
        for minute in subdirectories(&hour_dir).await?.into_iter().rev() {
            for second in subdirectories(&minute).await?.into_iter().rev() {
                if let Some(key) = keys_in(&second).await?.into_iter().next_back() {
                    return Ok(Some(key));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn query_by_time(&self, query: &TimeQuery) -> Result<BTreeSet<ContentKey>, StoreError> {
        let now = self.clock.now();
        let (start, end) = query.bounds();
        let dir = self.bucket_dir(&query.channel, &query.granularity.format_bucket(start));

        let mut keys = BTreeSet::new();
        match query.granularity {
            Granularity::Second => keys.extend(keys_in(&dir).await?),
            Granularity::Minute => {
                for second in subdirectories(&dir).await? {
                    keys.extend(keys_in(&second).await?);
                }
            }
        }
        keys.retain(|key| key.time() >= start && key.time() < end);
        if query.stable_only {
            keys.retain(|key| crate::is_stable(key, now));
        }
        trace!(channel = %query.channel, bucket = %dir.display(), found = keys.len(), "queried");
        Ok(keys)
    }

    async fn last_updated(
        &self,
        channel: &ChannelName,
        default: ContentPath,
    ) -> Result<ContentPath, StoreError> {
        let now = self.clock.now();
        let mut hour = now;
        while now - hour <= self.look_back {
            if let Some(key) = self.latest_in_hour(channel, hour).await? {
                return Ok(ContentPath::Key(key));
            }
            hour -= TimeDelta::hours(1);
        }
        Ok(default)
    }

    async fn channel_config(&self, channel: &ChannelName) -> Result<ChannelConfig, StoreError> {
        let dir = self.channel_dir(channel);
        match tokio::fs::read(dir.join(CONFIG_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Unavailable {
                channel: channel.clone(),
                message: format!("invalid {CONFIG_FILE}: {e}"),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if tokio::fs::try_exists(&dir).await? {
                    Ok(ChannelConfig::live(channel.clone()))
                } else {
                    Err(StoreError::UnknownChannel {
                        channel: channel.clone(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Lists the subdirectories of `dir` in name order; a missing `dir` is empty.
async fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Decodes the item files in one second directory; other files are skipped.
async fn keys_in(dir: &Path) -> io::Result<BTreeSet<ContentKey>> {
    let mut keys = BTreeSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(keys),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(key) = entry.file_name().to_str().and_then(|name| name.parse().ok()) {
            keys.insert(key);
        }
    }
    Ok(keys)
}
