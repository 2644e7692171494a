//! [`ContentPath`]: a delivery position, either a single key or a time window.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentKey, Granularity};

/// A position in a channel, as recorded by a webhook cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPath {
    /// A single item. Its time unit may still hold later items.
    Key(ContentKey),
    /// A time bucket and the stable keys found in it.
    Window(TimeWindow),
}

impl ContentPath {
    /// Returns the instant used for ordering and for computing the next window.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Key(key) => key.time(),
            Self::Window(window) => window.time,
        }
    }

    /// Returns the keys carried by this position, in ascending order.
    pub fn keys(&self) -> Vec<&ContentKey> {
        match self {
            Self::Key(key) => vec![key],
            Self::Window(window) => window.keys.iter().collect(),
        }
    }

    /// Returns `true` if `key` lies strictly after this position.
    ///
    /// A point admits keys greater than itself. A window admits keys at or
    /// after its end, because every earlier key in its bucket was either
    /// delivered with it or delivered before it.
    pub fn precedes(&self, key: &ContentKey) -> bool {
        match self {
            Self::Key(last) => last < key,
            Self::Window(window) => window.end() <= key.time(),
        }
    }

    /// Renders the position for use in URLs.
    pub fn to_url(&self) -> String {
        match self {
            Self::Key(key) => key.to_url(),
            Self::Window(window) => window.to_url(),
        }
    }

    /// Returns the window, if this position is one.
    pub fn as_window(&self) -> Option<&TimeWindow> {
        match self {
            Self::Key(_) => None,
            Self::Window(window) => Some(window),
        }
    }
}

impl std::fmt::Display for ContentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Window(window) => write!(
                f,
                "{}:{} ({} keys)",
                window.granularity,
                window.to_url(),
                window.keys.len()
            ),
        }
    }
}

impl From<ContentKey> for ContentPath {
    fn from(key: ContentKey) -> Self {
        Self::Key(key)
    }
}

impl From<TimeWindow> for ContentPath {
    fn from(window: TimeWindow) -> Self {
        Self::Window(window)
    }
}

/// A second- or minute-granular bucket of stable keys.
///
/// `time` is normally the bucket start. It can lie inside the bucket when the
/// window continues a partially delivered unit (after a point position, or
/// after switching from second to minute granularity); the bucket itself is
/// always `granularity.round_down(time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    granularity: Granularity,
    time: DateTime<Utc>,
    keys: BTreeSet<ContentKey>,
}

impl TimeWindow {
    /// Creates a window holding `keys`.
    pub fn new(
        granularity: Granularity,
        time: DateTime<Utc>,
        keys: impl IntoIterator<Item = ContentKey>,
    ) -> Self {
        Self {
            granularity,
            time,
            keys: keys.into_iter().collect(),
        }
    }

    /// Creates an empty window at the start of the unit containing `time`.
    pub fn empty(granularity: Granularity, time: DateTime<Utc>) -> Self {
        Self::new(granularity, granularity.round_down(time), [])
    }

    /// Returns the window's granularity.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Returns the window's time.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Returns the first instant of the window's bucket.
    pub fn start(&self) -> DateTime<Utc> {
        self.granularity.round_down(self.time)
    }

    /// Returns the first instant after the window's bucket.
    pub fn end(&self) -> DateTime<Utc> {
        self.start() + self.granularity.duration()
    }

    /// Returns the window's keys in ascending order.
    pub fn keys(&self) -> &BTreeSet<ContentKey> {
        &self.keys
    }

    /// Returns `true` if the window carries no keys.
    pub fn is_heartbeat(&self) -> bool {
        self.keys.is_empty()
    }

    /// Renders the bucket as `yyyy/MM/dd/HH/mm[/ss]`.
    pub fn to_url(&self) -> String {
        self.granularity.format_bucket(self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn key(time: DateTime<Utc>, disc: &str) -> ContentKey {
        ContentKey::new(time, disc).unwrap()
    }

    #[test]
    fn window_bounds_follow_granularity() {
        let minute = TimeWindow::empty(Granularity::Minute, at(10, 15, 42));
        assert_eq!(minute.time(), at(10, 15, 0));
        assert_eq!(minute.end(), at(10, 16, 0));
        assert_eq!(minute.to_url(), "2024/03/01/10/15");

        let second = TimeWindow::empty(Granularity::Second, at(10, 15, 42));
        assert_eq!(second.end(), at(10, 15, 43));
        assert_eq!(second.to_url(), "2024/03/01/10/15/42");
    }

    #[test]
    fn partial_window_ends_at_its_bucket_end() {
        let window = TimeWindow::new(Granularity::Minute, at(10, 15, 31), []);
        assert_eq!(window.start(), at(10, 15, 0));
        assert_eq!(window.end(), at(10, 16, 0));
    }

    #[test]
    fn point_admits_only_strictly_greater_keys() {
        let point = ContentPath::Key(key(at(9, 0, 0), "m"));
        assert!(!point.precedes(&key(at(9, 0, 0), "a")));
        assert!(!point.precedes(&key(at(9, 0, 0), "m")));
        assert!(point.precedes(&key(at(9, 0, 0), "z")));
        assert!(point.precedes(&key(at(9, 0, 1), "a")));
    }

    #[test]
    fn window_admits_keys_from_its_end() {
        let window: ContentPath = TimeWindow::empty(Granularity::Second, at(9, 0, 30)).into();
        assert!(!window.precedes(&key(at(9, 0, 30), "z")));
        assert!(window.precedes(&key(at(9, 0, 31), "a")));
    }

    #[test]
    fn keys_are_kept_in_order() {
        let window = TimeWindow::new(
            Granularity::Minute,
            at(9, 0, 0),
            [key(at(9, 0, 30), "b"), key(at(9, 0, 0), "a")],
        );
        let discs: Vec<_> = window.keys().iter().map(ContentKey::discriminator).collect();
        assert_eq!(discs, ["a", "b"]);
        assert!(!window.is_heartbeat());
    }

    #[test]
    fn cursor_json_is_re_decodable() {
        let path: ContentPath =
            TimeWindow::new(Granularity::Second, at(1, 2, 3), [key(at(1, 2, 3), "k")]).into();
        let json = serde_json::to_string(&path).unwrap();
        let back: ContentPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
