//! [`ContentKey`]: the identity and stream position of one content item.
//!
//! A key is a millisecond-precision UTC instant plus a short discriminator
//! that breaks ties between items written in the same millisecond. Keys order
//! by instant first and discriminator second, which is also the order in
//! which a channel's items are delivered.
//!
//! The canonical encoding is `<epochMillis>-<discriminator>`. The
//! hierarchical URL rendering (`yyyy/MM/dd/HH/mm/ss/<canonical>`) is derived
//! from it and is never used as the source of truth.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::KeyParseError;

/// Length of a generated discriminator.
pub const DISCRIMINATOR_LEN: usize = 6;

/// Immutable, totally ordered identifier of a content item.
///
/// Field order matters: the derived [`Ord`] compares `time` first, then
/// `discriminator` lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentKey {
    time: DateTime<Utc>,
    discriminator: String,
}

impl ContentKey {
    /// Creates a key from an instant and a discriminator.
    ///
    /// The instant is truncated to millisecond precision. The discriminator
    /// must be non-empty ASCII alphanumerics so that the canonical encoding
    /// stays unambiguous.
    pub fn new(
        time: DateTime<Utc>,
        discriminator: impl Into<String>,
    ) -> Result<Self, KeyParseError> {
        let discriminator = discriminator.into();
        if discriminator.is_empty() || !discriminator.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(KeyParseError::InvalidDiscriminator { discriminator });
        }
        let millis = time.timestamp_millis();
        let time = DateTime::from_timestamp_millis(millis)
            .ok_or(KeyParseError::TimestampOutOfRange { millis })?;
        Ok(Self {
            time,
            discriminator,
        })
    }

    /// Creates a key at `time` with a random discriminator.
    pub fn generate(time: DateTime<Utc>) -> Self {
        let discriminator: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(DISCRIMINATOR_LEN)
            .map(char::from)
            .collect();
        let millis = time.timestamp_millis();
        Self {
            time: DateTime::from_timestamp_millis(millis).unwrap_or(time),
            discriminator,
        }
    }

    /// Returns the key's instant.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Returns the key's instant as epoch milliseconds.
    pub fn millis(&self) -> i64 {
        self.time.timestamp_millis()
    }

    /// Returns the tie-breaking discriminator.
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Renders the hierarchical, URL-safe form:
    /// `yyyy/MM/dd/HH/mm/ss/<epochMillis>-<discriminator>`.
    pub fn to_url(&self) -> String {
        format!("{}/{}", self.time.format("%Y/%m/%d/%H/%M/%S"), self)
    }

    /// Parses either the canonical encoding or the hierarchical rendering.
    ///
    /// Only the final path segment is decoded; the date directories are
    /// redundant with the epoch milliseconds.
    pub fn from_url(url: &str) -> Result<Self, KeyParseError> {
        let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
        last.parse()
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis(), self.discriminator)
    }
}

impl FromStr for ContentKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The discriminator never contains '-', so the last one is the split.
        let (millis, discriminator) = s.rsplit_once('-').ok_or_else(|| KeyParseError::Malformed {
            input: s.to_string(),
        })?;
        let millis: i64 = millis.parse().map_err(|_| KeyParseError::Malformed {
            input: s.to_string(),
        })?;
        let time = DateTime::from_timestamp_millis(millis)
            .ok_or(KeyParseError::TimestampOutOfRange { millis })?;
        Self::new(time, discriminator)
    }
}

impl TryFrom<String> for ContentKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.to_string()
    }
}
