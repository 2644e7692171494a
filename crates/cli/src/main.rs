//! `hubd`: webhook delivery daemon and admin tool.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load `hubd.toml` (see [`config`]) and validate
//!    every webhook in it.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or human
//!    formatter, plus an OpenTelemetry OTLP exporter when configured.
//! 3. **Construct infrastructure**: the file content store, file cursor
//!    store, in-process leader election, and HTTP callback client, injected
//!    into a [`webhook::WebhookRegistry`].
//! 4. **Run a command**: `run` (default) serves every configured webhook until
//!    Ctrl-C; `append`, `cursor` and `reset-cursor` are one-shot admin tools.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use callback::HttpCallbackClient;
use clap::{Parser, Subcommand};
use cluster::{FileCursorStore, LocalLeaderElection};
use hub::{ChannelName, ContentKey, ContentPath, CursorStore, SystemClock, WebhookName};
use store::FileContentStore;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use webhook::{Services, WebhookRegistry};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "hubd", version, about = "Channel hub webhook delivery")]
struct Cli {
    /// Configuration file.
    #[arg(long, short, env = "HUBD_CONFIG", default_value = "hubd.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deliver every configured webhook until interrupted.
    Run,
    /// Store one item in a channel and print its key.
    Append {
        channel: String,
        /// Read the item from this file instead of stdin.
        file: Option<PathBuf>,
    },
    /// Show a webhook's cursor.
    Cursor { webhook: String },
    /// Move a webhook's cursor to an explicit key. Stop `hubd run` first.
    ResetCursor { webhook: String, key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let telemetry = telemetry::init(&config.telemetry)?;

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Append { channel, file } => append(&config, &channel, file).await,
        Command::Cursor { webhook } => show_cursor(&config, &webhook).await,
        Command::ResetCursor { webhook, key } => reset_cursor(&config, &webhook, &key).await,
    };

    telemetry.shutdown();
    result
}

async fn run(config: Config) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(FileContentStore::new(config.hub.content_dir(), clock.clone()));
    for channel in &config.channels {
        store
            .create_channel(channel)
            .await
            .with_context(|| format!("creating channel {}", channel.name))?;
    }

    let services = Services {
        store,
        cursors: Arc::new(FileCursorStore::new(config.hub.cursor_dir())),
        election: Arc::new(LocalLeaderElection::new()),
        client: Arc::new(HttpCallbackClient::new(config.callback)?),
        clock,
    };
    let registry = WebhookRegistry::new(services, config.delivery.tailer_settings());
    for webhook in config.webhooks {
        let name = webhook.name.clone();
        let upserted = registry.upsert(webhook).await?;
        info!(webhook = %name, ?upserted, "webhook registered");
    }
    if registry.names().await.is_empty() {
        warn!(config = ?config.hub, "no webhooks configured");
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    registry.shutdown().await;
    Ok(())
}

async fn append(config: &Config, channel: &str, file: Option<PathBuf>) -> Result<()> {
    let channel = ChannelName::new(channel).context("invalid channel name")?;
    let content = match file {
        Some(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut content = Vec::new();
            tokio::io::stdin().read_to_end(&mut content).await?;
            content
        }
    };
    let store = FileContentStore::new(config.hub.content_dir(), Arc::new(SystemClock));
    let key = store.append(&channel, &content).await?;
    println!("{}", key.to_url());
    Ok(())
}

async fn show_cursor(config: &Config, webhook: &str) -> Result<()> {
    let name = WebhookName::new(webhook).context("invalid webhook name")?;
    let cursors = FileCursorStore::new(config.hub.cursor_dir());
    match cursors.peek(&name).await? {
        Some(path) => println!("{}", serde_json::to_string_pretty(&path)?),
        None => println!("no cursor for {name}"),
    }
    Ok(())
}

async fn reset_cursor(config: &Config, webhook: &str, key: &str) -> Result<()> {
    let name = WebhookName::new(webhook).context("invalid webhook name")?;
    let key = ContentKey::from_url(key)?;
    let cursors = FileCursorStore::new(config.hub.cursor_dir());
    let previous = cursors.peek(&name).await?;
    cursors.set(&name, &ContentPath::Key(key.clone())).await?;
    info!(webhook = %name, %key, previous = ?previous, "cursor reset");
    println!("{name}: cursor moved to {}", key.to_url());
    Ok(())
}
