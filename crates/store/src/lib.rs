//! Content store adapters.
//!
//! Implements the [`hub::ContentStore`] port. The delivery engine only ever
//! reads through the port; the producer-side methods (`insert_*`, `append`)
//! exist so tests and the `hubd` binary can put content in.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain delivery rules.
//!
//! | Adapter | Backing |
//! |---------|---------|
//! | [`MemoryContentStore`] | In-process ordered sets, one per channel |
//! | [`FileContentStore`] | One file per item under `<root>/<channel>/yyyy/MM/dd/HH/mm/ss/` |
//!
//! Both treat keys at or after the start of the current second as unstable.

pub mod file;
pub mod memory;

pub use file::FileContentStore;
pub use memory::MemoryContentStore;

use chrono::{DateTime, Utc};
use hub::{ContentKey, Granularity};

/// Returns `true` if `key` may be served to a `stable_only` query at `now`.
pub(crate) fn is_stable(key: &ContentKey, now: DateTime<Utc>) -> bool {
    key.time() < Granularity::Second.round_down(now)
}
