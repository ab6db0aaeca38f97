//! Subscription system for live feed updates.
//!
//! Consumers (UI panels, bots) subscribe to the reconciled queue view:
//! - Every new subscriber first receives a `Snapshot` baseline, so it
//!   starts consistent regardless of when it attaches.
//! - Incremental updates follow: upserts, closes, connectivity changes.
//! - Delivery is fire-and-forget over bounded buffers; a slow consumer is
//!   dropped rather than ever blocking the store.
//!
//! # Example
//!
//! ```ignore
//! let sub = session.subscribe(SubscriptionConfig::default());
//!
//! loop {
//!     match sub.recv() {
//!         Ok(FeedUpdate::Snapshot { dialogs, .. }) => render_all(dialogs),
//!         Ok(FeedUpdate::DialogUpserted { dialog }) => upsert_row(dialog),
//!         Ok(FeedUpdate::DialogClosed { id }) => remove_row(id),
//!         Ok(FeedUpdate::DialogLeftView { id }) => remove_row(id),
//!         Ok(FeedUpdate::Connection { state }) => show_indicator(state),
//!         Ok(FeedUpdate::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, FeedSubscription, FeedUpdate, SubscriptionConfig, SubscriptionFilter,
    SubscriptionId,
};
