//! Newtype domain identifiers.
//!
//! Every named concept in the hub is a distinct newtype wrapping a primitive.
//! This prevents accidentally passing a [`ChannelName`] where a
//! [`WebhookName`] is expected even though both are strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or contains a path separator.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let invalid = v.is_empty() || v == "." || v == ".." || v.contains(['/', '\\']);
                if invalid { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| concat!(stringify!($name), " must be a non-empty name without path separators").to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifies a webhook subscription.
    ///
    /// The name keys the webhook's cursor and its leadership node, so it must
    /// stay stable across configuration changes.
    WebhookName
}

string_id! {
    /// Identifies a channel: a named, append-only, time-ordered stream.
    ChannelName
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one process's claim on a webhook's leadership.
///
/// Generated fresh for every acquisition so that a stale holder can never
/// release a lease that has since been granted to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaderId(Uuid);

impl LeaderId {
    /// Generates a new random holder identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

}

impl std::fmt::Display for LeaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
