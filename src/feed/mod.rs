//! Feed reconciliation engine.
//!
//! [`FeedStore`] owns the authoritative in-memory view of queued dialogs,
//! reconciling a point-in-time snapshot with a live event stream under
//! out-of-order and duplicate delivery:
//!
//! - Per-dialog version rule: lower-version updates are discarded.
//! - Closed dialogs become tombstones for a grace period, absorbing
//!   duplicate or reordered close events.
//! - Events for ids the store has not seen yet are buffered and replayed
//!   once the id appears via snapshot or a `created` event.
//! - Sequence gaps on the stream degrade the connection and demand a fresh
//!   seed; the store never reconstructs missing events.

mod store;

pub use store::{ApplyOutcome, FeedStore};
