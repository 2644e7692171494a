//! Cursor stores.
//!
//! A cursor is a [`ContentPath`] serialized as JSON. The file store writes a
//! sibling temp file and renames it over the cursor, so a reader sees either
//! the old or the new position, never a torn one.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::path::PathBuf;

use async_trait::async_trait;
use hub::{ContentPath, CursorError, CursorStore, WebhookName};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Cursors held in memory.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<WebhookName, ContentPath>>,
    failing: AtomicBool,
}

impl MemoryCursorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent [`set`](CursorStore::set) fail with
    /// [`CursorError::Unavailable`]. Reads keep working.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(
        &self,
        webhook: &WebhookName,
        default: ContentPath,
    ) -> Result<ContentPath, CursorError> {
        Ok(self
            .cursors
            .lock()
            .entry(webhook.clone())
            .or_insert(default)
            .clone())
    }

    async fn peek(&self, webhook: &WebhookName) -> Result<Option<ContentPath>, CursorError> {
        Ok(self.cursors.lock().get(webhook).cloned())
    }

    async fn set(&self, webhook: &WebhookName, path: &ContentPath) -> Result<(), CursorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CursorError::Unavailable {
                webhook: webhook.clone(),
                message: "writes disabled".to_string(),
            });
        }
        trace!(%webhook, cursor = %path, "cursor set");
        self.cursors.lock().insert(webhook.clone(), path.clone());
        Ok(())
    }

    async fn delete(&self, webhook: &WebhookName) -> Result<(), CursorError> {
        self.cursors.lock().remove(webhook);
        Ok(())
    }
}

/// Cursors stored as `<dir>/<webhook>.json`.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    dir: PathBuf,
}

impl FileCursorStore {
    /// Uses `dir`, creating it on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, webhook: &WebhookName) -> PathBuf {
        self.dir.join(format!("{webhook}.json"))
    }

    async fn write(&self, webhook: &WebhookName, path: &ContentPath) -> Result<(), CursorError> {
        let json = serde_json::to_vec(path).map_err(|e| CursorError::Corrupt {
            webhook: webhook.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let staging = self.dir.join(format!(".{webhook}.json.tmp"));
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, self.path(webhook)).await?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(
        &self,
        webhook: &WebhookName,
        default: ContentPath,
    ) -> Result<ContentPath, CursorError> {
        match self.peek(webhook).await? {
            Some(path) => Ok(path),
            None => {
                debug!(%webhook, cursor = %default, "initialising cursor");
                self.write(webhook, &default).await?;
                Ok(default)
            }
        }
    }

    async fn peek(&self, webhook: &WebhookName) -> Result<Option<ContentPath>, CursorError> {
        let bytes = match tokio::fs::read(self.path(webhook)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CursorError::Corrupt {
                webhook: webhook.clone(),
                message: e.to_string(),
            })
    }

    async fn set(&self, webhook: &WebhookName, path: &ContentPath) -> Result<(), CursorError> {
        self.write(webhook, path).await?;
        trace!(%webhook, cursor = %path, "cursor set");
        Ok(())
    }

    async fn delete(&self, webhook: &WebhookName) -> Result<(), CursorError> {
        match tokio::fs::remove_file(self.path(webhook)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
