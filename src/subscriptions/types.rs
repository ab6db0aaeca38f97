//! Subscription types for live feed updates.

use crate::types::{ConnectionState, Dialog, DialogId, DialogStatus};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered updates before dropping the subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions. The default passes everything.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only deliver dialogs in these statuses (None = all). Closes and
    /// connectivity changes always pass, and an upsert that stops matching
    /// arrives as a `DialogLeftView`, so a filtered consumer can always
    /// drop rows it holds and show the indicator.
    pub statuses: Option<Vec<DialogStatus>>,
}

impl SubscriptionFilter {
    /// Only dialogs in one status.
    pub fn status(status: DialogStatus) -> Self {
        Self {
            statuses: Some(vec![status]),
        }
    }

    pub fn matches(&self, dialog: &Dialog) -> bool {
        match &self.statuses {
            Some(statuses) => statuses.contains(&dialog.status),
            None => true,
        }
    }
}

/// Updates delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedUpdate {
    /// Full consistent baseline. Sent once on subscribe, and again after
    /// every re-seed (the whole view was replaced).
    Snapshot {
        dialogs: Vec<Dialog>,
        connection: ConnectionState,
    },

    /// A dialog entered or changed within the view.
    DialogUpserted { dialog: Dialog },

    /// A dialog left the view.
    DialogClosed { id: DialogId },

    /// A dialog stopped matching this subscription's filter. It is still
    /// live in the feed; drop the locally held row.
    DialogLeftView { id: DialogId },

    /// Connectivity changed.
    Connection { state: ConnectionState },

    /// This subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle for receiving feed updates.
pub struct FeedSubscription {
    pub id: SubscriptionId,
    /// Channel to receive updates.
    pub receiver: crossbeam_channel::Receiver<FeedUpdate>,
}

impl FeedSubscription {
    /// Receive the next update (blocking).
    pub fn recv(&self) -> Result<FeedUpdate, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an update (non-blocking).
    pub fn try_recv(&self) -> Result<FeedUpdate, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<FeedUpdate, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
