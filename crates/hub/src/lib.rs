//! Core domain for the channel hub's webhook delivery engine.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, error type, and port trait used throughout the workspace.
//! Infrastructure crates implement the ports defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Domain model + port definitions.** This crate has no I/O dependencies.
//! It defines *what* the engine needs; infrastructure crates define *how* to
//! supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`WebhookName`, `ChannelName`, `LeaderId`) |
//! | [`key`] | `ContentKey` and its canonical encoding |
//! | [`path`] | `ContentPath` delivery positions and `TimeWindow` |
//! | [`types`] | `Granularity`, `Webhook`, `ChannelConfig`, `TimeQuery` |
//! | [`clock`] | Injectable wall clock |
//! | [`ports`] | Content store, cursor store, leader election, callback client |
//! | [`errors`] | Error types per concern |

pub mod clock;
pub mod errors;
pub mod identifiers;
pub mod key;
pub mod path;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{
    CallbackError, CoordinationError, CursorError, KeyParseError, StoreError, WebhookError,
};
pub use identifiers::{ChannelName, LeaderId, WebhookName};
pub use key::ContentKey;
pub use path::{ContentPath, TimeWindow};
pub use ports::{
    CallbackClient, CallbackResponse, ContentStore, CursorStore, LeaderElection, LeadershipLease,
};
pub use types::{ChannelConfig, DeliveryMode, Granularity, TimeQuery, Webhook};
