//! # Dialog Feed
//!
//! A synchronization engine that keeps an operator's view of "dialogs
//! waiting for a human" consistent and live across an unreliable network.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: a point-in-time, authoritative listing of the queue
//! - **Event stream**: incremental lifecycle deltas, at-least-once and
//!   possibly reordered within one connection
//! - **Reconciliation**: per-dialog version rule, close tombstones, and
//!   sequence-gap detection keep the merged view free of stale or
//!   duplicated dialogs
//! - **Subscriptions**: consumers attach at any time and always start from
//!   a consistent baseline
//!
//! ## Example
//!
//! ```ignore
//! use dialog_feed::{
//!     FeedSession, HttpSnapshotLoader, SnapshotFilter, SubscriptionConfig,
//! };
//!
//! let loader = HttpSnapshotLoader::new("http://localhost:8000", token)?;
//! let session = FeedSession::new(loader);
//!
//! let sub = session.subscribe(SubscriptionConfig::default());
//!
//! // Bridge your websocket client into a channel, then drive the session
//! // on its own thread.
//! std::thread::spawn(move || {
//!     session.drive(&channel, &SnapshotFilter::waiting_operator())
//! });
//! ```

pub mod channel;
pub mod error;
pub mod feed;
pub mod session;
pub mod snapshot;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use channel::{
    memory_channel, ChannelDriver, ChannelMessage, DisconnectCause, EventChannel, MemoryChannel,
};
pub use error::{FeedError, Result};
pub use feed::{ApplyOutcome, FeedStore};
pub use session::{FeedSession, SessionSignal};
pub use snapshot::{HttpSnapshotLoader, SnapshotLoader};
pub use subscriptions::{
    DropReason, FeedSubscription, FeedUpdate, SubscriptionConfig, SubscriptionFilter,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
