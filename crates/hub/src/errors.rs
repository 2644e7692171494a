//! Error types for the hub domain and its ports.
//!
//! Each port has its own error enum so that callers can tell a store outage
//! from a cursor outage without string matching. The delivery engine decides
//! what is fatal: a [`CallbackError`] is retried, a [`StoreError`] fails the
//! scheduler, and a [`CursorError`] ends the leadership cycle.

use thiserror::Error;

use crate::{ChannelName, WebhookName};

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

/// A string could not be decoded into a [`crate::ContentKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    /// The input is not of the form `<epochMillis>-<discriminator>`.
    #[error("malformed content key '{input}'")]
    Malformed {
        /// The rejected input.
        input: String,
    },

    /// The timestamp component is not a representable instant.
    #[error("content key timestamp {millis} is out of range")]
    TimestampOutOfRange {
        /// Epoch milliseconds that could not be converted.
        millis: i64,
    },

    /// The discriminator is empty or contains characters other than ASCII
    /// alphanumerics.
    #[error("invalid content key discriminator '{discriminator}'")]
    InvalidDiscriminator {
        /// The rejected discriminator.
        discriminator: String,
    },
}

/// A webhook definition failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// The callback URL is not an absolute HTTP(S) URL.
    #[error("webhook '{name}': callback url '{url}' must be an http or https url")]
    InvalidCallbackUrl {
        /// Webhook being validated.
        name: WebhookName,
        /// The rejected URL.
        url: String,
    },

    /// The parallelism limit is zero.
    #[error("webhook '{name}': parallel calls must be at least 1")]
    InvalidParallelism {
        /// Webhook being validated.
        name: WebhookName,
    },

    /// The channel URL is empty.
    #[error("webhook '{name}': channel url must not be empty")]
    MissingChannelUrl {
        /// Webhook being validated.
        name: WebhookName,
    },
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::ContentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The channel does not exist in this store.
    #[error("unknown channel '{channel}'")]
    UnknownChannel {
        /// Channel that was queried.
        channel: ChannelName,
    },

    /// The backend could not answer the query.
    #[error("content store unavailable for '{channel}': {message}")]
    Unavailable {
        /// Channel that was queried.
        channel: ChannelName,
        /// Backend-specific description.
        message: String,
    },

    /// Underlying I/O failure.
    #[error("content store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a [`crate::CursorStore`].
///
/// Any cursor failure is fatal for the current delivery cycle: without a
/// durable cursor, progress cannot be recorded.
#[derive(Debug, Error)]
pub enum CursorError {
    /// The backend could not be reached.
    #[error("cursor store unavailable for '{webhook}': {message}")]
    Unavailable {
        /// Webhook whose cursor was accessed.
        webhook: WebhookName,
        /// Backend-specific description.
        message: String,
    },

    /// A persisted cursor could not be decoded.
    #[error("cursor for '{webhook}' is corrupt: {message}")]
    Corrupt {
        /// Webhook whose cursor was read.
        webhook: WebhookName,
        /// Decoder description.
        message: String,
    },

    /// Underlying I/O failure.
    #[error("cursor store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a [`crate::LeaderElection`] implementation.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The coordination service could not be reached.
    #[error("leader election unavailable for '{webhook}': {message}")]
    Unavailable {
        /// Webhook whose leadership was requested.
        webhook: WebhookName,
        /// Backend-specific description.
        message: String,
    },
}

/// A single callback attempt failed before an HTTP status was received.
///
/// Non-200 responses are not errors at this layer; they are reported as a
/// [`crate::CallbackResponse`] and judged by the retry policy.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Connection, TLS, timeout, or other transport failure.
    #[error("callback to '{url}' failed: {message}")]
    Transport {
        /// Target URL.
        url: String,
        /// Transport description.
        message: String,
    },
}
