//! Cluster coordination adapters.
//!
//! Implements the [`hub::LeaderElection`] and [`hub::CursorStore`] ports.
//!
//! | Adapter | Port | Scope |
//! |---------|------|-------|
//! | [`LocalLeaderElection`] | `LeaderElection` | One process; leases can be revoked by hand |
//! | [`MemoryCursorStore`] | `CursorStore` | One process, not durable |
//! | [`FileCursorStore`] | `CursorStore` | One JSON file per webhook, replaced atomically |
//!
//! ## Deployment Scenarios
//!
//! | Scenario | Election | Cursors |
//! |----------|----------|---------|
//! | Tests | `LocalLeaderElection` | `MemoryCursorStore` |
//! | Single node `hubd` | `LocalLeaderElection` | `FileCursorStore` |
//!
//! A multi-node deployment needs a coordination service behind both ports.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The delivery engine sees only the port traits.

pub mod cursor;
pub mod election;

pub use cursor::{FileCursorStore, MemoryCursorStore};
pub use election::LocalLeaderElection;
