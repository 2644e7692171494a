//! `hubd.toml` configuration.
//!
//! Every section is optional; a missing file means all defaults and no
//! webhooks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use callback::CallbackClientConfig;
use hub::{ChannelConfig, Webhook};
use serde::{Deserialize, Serialize};
use webhook::{RetryPolicy, TailerSettings};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hub: HubConfig,
    pub telemetry: TelemetryConfig,
    pub callback: CallbackClientConfig,
    pub delivery: DeliveryConfig,
    pub channels: Vec<ChannelConfig>,
    pub webhooks: Vec<Webhook>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Root of the content and cursor directories.
    pub data_dir: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl HubConfig {
    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join("content")
    }

    pub fn cursor_dir(&self) -> PathBuf {
        self.data_dir.join("cursors")
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
    /// OTLP gRPC endpoint; spans are exported only when set.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
            otlp_endpoint: None,
            service_name: "hubd".to_string(),
        }
    }
}

/// Delivery tunables, in whole units for readability in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub poll_timeout_secs: u64,
    pub retry_initial_delay_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_delay_secs: u64,
    pub supervision_backoff_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        let settings = TailerSettings::default();
        Self {
            poll_timeout_secs: settings.poll_timeout.as_secs(),
            retry_initial_delay_ms: settings.retry.initial_delay.as_millis() as u64,
            retry_multiplier: settings.retry.multiplier,
            retry_max_delay_secs: settings.retry.max_delay.as_secs(),
            supervision_backoff_secs: settings.supervision_backoff.as_secs(),
        }
    }
}

impl DeliveryConfig {
    pub fn tailer_settings(&self) -> TailerSettings {
        TailerSettings {
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            retry: RetryPolicy::new(
                Duration::from_millis(self.retry_initial_delay_ms),
                self.retry_multiplier,
                Duration::from_secs(self.retry_max_delay_secs),
            ),
            supervision_backoff: Duration::from_secs(self.supervision_backoff_secs),
        }
    }
}

impl Config {
    /// Loads `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        for webhook in &config.webhooks {
            webhook.validate()?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub::{DeliveryMode, Granularity};

    #[test]
    fn missing_file_is_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.callback.connect_timeout_secs, 30);
        assert_eq!(config.callback.request_timeout_secs, 120);
        assert_eq!(config.delivery.tailer_settings().retry, RetryPolicy::DEFAULT);
    }

    #[test]
    fn parses_a_full_file() {
        let config = Config::parse(
            r#"
            [hub]
            data_dir = "/var/lib/hubd"

            [telemetry]
            format = "pretty"
            otlp_endpoint = "http://collector:4317"

            [delivery]
            retry_max_delay_secs = 30

            [[channels]]
            name = "orders"
            live = false

            [[webhooks]]
            name = "orders-audit"
            channel = "orders"
            channel_url = "http://hub/channel/orders"
            callback_url = "http://audit/cb"
            granularity = "minute"
            mode = "fire_and_forget"
            parallel_calls = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.hub.cursor_dir(), PathBuf::from("/var/lib/hubd/cursors"));
        assert_eq!(config.telemetry.format, LogFormat::Pretty);
        assert_eq!(config.telemetry.filter, "info");
        assert_eq!(
            config.delivery.tailer_settings().retry.max_delay,
            Duration::from_secs(30)
        );
        assert!(!config.channels[0].live);

        let webhook = &config.webhooks[0];
        assert_eq!(webhook.granularity, Granularity::Minute);
        assert_eq!(webhook.mode, DeliveryMode::FireAndForget);
        assert_eq!(webhook.queue_capacity(), 8);
        assert!(!webhook.paused);
    }

    #[test]
    fn invalid_webhooks_are_rejected_at_load() {
        let result = Config::parse(
            r#"
            [[webhooks]]
            name = "bad"
            channel = "orders"
            channel_url = "http://hub/channel/orders"
            callback_url = "mailto:someone"
            "#,
        );
        assert!(result.is_err());
    }
}
