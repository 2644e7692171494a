//! Webhook delivery engine.
//!
//! Tails a channel in fixed time windows and POSTs one callback per window,
//! in order, recording progress in a per-webhook cursor. Exactly one process
//! in the cluster delivers a given webhook; leadership is delegated to a
//! [`hub::LeaderElection`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Everything here runs against the port traits in
//! the [`hub`] crate. No adapter is referenced outside tests.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`strategy`] | Window granularity rules, stable boundary, fast-forward |
//! | [`scheduler`] | Tailing scheduler producing windows on a fixed-rate tick |
//! | [`queue`] | Bounded delivery queue with failure propagation |
//! | [`dispatcher`] | Transactional and fire-and-forget callback delivery |
//! | [`retry`] | Exponential backoff for transactional callbacks |
//! | [`payload`] | Callback JSON body |
//! | [`signal`] | Per-cycle stop and failure signal |
//! | [`leader`] | Leadership-gated tailer lifecycle |
//! | [`registry`] | The set of webhooks served by this process |
//! | [`error`] | Cycle-ending errors |
//!
//! ## Delivery guarantees
//!
//! Transactional webhooks are delivered at least once: the cursor moves only
//! after a `200 OK`, and a new leader resumes from the cursor. Windows reach
//! the callback in strictly increasing time order with no gaps.

pub mod dispatcher;
pub mod error;
pub mod leader;
pub mod payload;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod signal;
pub mod strategy;

pub use dispatcher::{CallbackDispatcher, Dispatched};
pub use error::TailError;
pub use leader::{Services, TailerSettings, WebhookLeader};
pub use payload::{CallbackPayload, PayloadType};
pub use queue::{delivery_queue, DeliveryReceiver, DeliverySender, Polled, DEFAULT_POLL_TIMEOUT};
pub use registry::{Upserted, WebhookRegistry, WebhookStatus};
pub use retry::{RetryOutcome, RetryPolicy};
pub use scheduler::TailingScheduler;
pub use signal::{CycleSignal, StopReason};
pub use strategy::{WindowStrategy, FAST_FORWARD_THRESHOLD_MINUTES};
