//! The JSON body POSTed to a webhook callback.

use hub::{ContentPath, Webhook};
use serde::Serialize;

/// Whether a payload carries content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    /// At least one URI.
    Items,
    /// No new content in the window; sent so receivers can see liveness.
    Heartbeat,
}

/// Callback body for one delivery position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    /// Webhook name.
    pub name: String,
    /// URL rendering of the position.
    pub id: String,
    /// The position under the channel URL.
    pub url: String,
    /// `url` with `?batch=true`.
    pub batch_url: String,
    /// `url` with `?bulk=true`.
    pub bulk_url: String,
    /// One URL per key, ascending.
    pub uris: Vec<String>,
    /// `items` or `heartbeat`.
    #[serde(rename = "type")]
    pub kind: PayloadType,
}

impl CallbackPayload {
    /// Builds the payload announcing `path` for `webhook`.
    pub fn new(webhook: &Webhook, path: &ContentPath) -> Self {
        let channel_url = webhook.channel_base_url();
        let id = path.to_url();
        let url = format!("{channel_url}/{id}");
        let uris: Vec<String> = path
            .keys()
            .into_iter()
            .map(|key| format!("{channel_url}/{}", key.to_url()))
            .collect();
        let kind = if uris.is_empty() {
            PayloadType::Heartbeat
        } else {
            PayloadType::Items
        };
        Self {
            name: webhook.name.to_string(),
            batch_url: format!("{url}?batch=true"),
            bulk_url: format!("{url}?bulk=true"),
            id,
            url,
            uris,
            kind,
        }
    }

    /// Serializes the payload for a [`hub::CallbackClient`].
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
