//! Subscription manager for broadcasting feed updates.

use crate::types::{ConnectionState, Dialog, DialogId};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, FeedSubscription, FeedUpdate, SubscriptionConfig, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<FeedUpdate>,
}

impl Subscription {
    /// Try to send an update. Returns false if the buffer is full or the
    /// receiver is gone (subscriber will be dropped).
    fn try_send(&self, update: FeedUpdate) -> bool {
        match self.sender.try_send(update) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages subscriptions and broadcasts feed updates.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription seeded with a consistent baseline.
    ///
    /// `baseline` is evaluated while the subscription table is write-locked,
    /// so no broadcast can slip between the baseline read and registration.
    /// An update accepted concurrently is at worst delivered twice, which
    /// the per-dialog version rule makes harmless.
    pub fn subscribe_with<F>(&self, config: SubscriptionConfig, baseline: F) -> FeedSubscription
    where
        F: FnOnce() -> (Vec<Dialog>, ConnectionState),
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        let mut subs = self.subscriptions.write();

        let (dialogs, connection) = baseline();
        let dialogs = dialogs
            .into_iter()
            .filter(|d| config.filter.matches(d))
            .collect();
        // Buffer is empty and at least 1 deep, cannot fail.
        let _ = sender.try_send(FeedUpdate::Snapshot {
            dialogs,
            connection,
        });

        subs.insert(id, Subscription { config, sender });

        FeedSubscription { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort.
            let _ = sub.sender.try_send(FeedUpdate::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Broadcast an inserted/updated dialog. Matching subscriptions get the
    /// upsert; the rest get a `DialogLeftView`, since the dialog may have
    /// just transitioned out of their filter and the held row would
    /// otherwise stay stale until the next re-seed.
    pub fn broadcast_upserted(&self, dialog: &Dialog) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                let update = if sub.config.filter.matches(dialog) {
                    FeedUpdate::DialogUpserted {
                        dialog: dialog.clone(),
                    }
                } else {
                    FeedUpdate::DialogLeftView { id: dialog.id }
                };
                if !sub.try_send(update) {
                    to_remove.push(*id);
                }
            }
        }

        self.remove_overflowed(to_remove);
    }

    /// Broadcast a dialog leaving the view. Delivered to every subscriber
    /// regardless of filter: consumers holding the row must always learn it
    /// is gone.
    pub fn broadcast_closed(&self, id: DialogId) {
        self.broadcast(FeedUpdate::DialogClosed { id });
    }

    /// Broadcast a connectivity change.
    pub fn broadcast_connection(&self, state: ConnectionState) {
        self.broadcast(FeedUpdate::Connection { state });
    }

    /// Broadcast a fresh baseline after a re-seed, per-subscriber filtered.
    pub fn broadcast_snapshot(&self, dialogs: &[Dialog], connection: ConnectionState) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                let filtered: Vec<Dialog> = dialogs
                    .iter()
                    .filter(|d| sub.config.filter.matches(d))
                    .cloned()
                    .collect();
                let sent = sub.try_send(FeedUpdate::Snapshot {
                    dialogs: filtered,
                    connection,
                });
                if !sent {
                    to_remove.push(*id);
                }
            }
        }

        self.remove_overflowed(to_remove);
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast(&self, update: FeedUpdate) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.try_send(update.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        self.remove_overflowed(to_remove);
    }

    fn remove_overflowed(&self, ids: Vec<SubscriptionId>) {
        if ids.is_empty() {
            return;
        }
        let mut subs = self.subscriptions.write();
        for id in ids {
            if let Some(sub) = subs.remove(&id) {
                // Try to notify about the drop (might fail, that's ok).
                let _ = sub.sender.try_send(FeedUpdate::Dropped {
                    reason: DropReason::BufferOverflow,
                });
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::SubscriptionFilter;
    use crate::types::{DialogStatus, Timestamp, Version};
    use std::time::Duration;

    fn make_dialog(id: u64, status: DialogStatus) -> Dialog {
        Dialog {
            id: DialogId(id),
            status,
            last_message_at: Timestamp(100),
            version: Version(1),
            assigned_operator: None,
        }
    }

    fn empty_baseline() -> (Vec<Dialog>, ConnectionState) {
        (Vec::new(), ConnectionState::Synced)
    }

    #[test]
    fn test_subscribe_receives_baseline_first() {
        let manager = SubscriptionManager::new();
        let dialogs = vec![make_dialog(1, DialogStatus::WaitingOperator)];

        let sub = manager.subscribe_with(SubscriptionConfig::default(), || {
            (dialogs.clone(), ConnectionState::Synced)
        });

        let update = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        match update {
            FeedUpdate::Snapshot {
                dialogs: got,
                connection,
            } => {
                assert_eq!(got, dialogs);
                assert_eq!(connection, ConnectionState::Synced);
            }
            other => panic!("Expected Snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let sub = manager.subscribe_with(SubscriptionConfig::default(), empty_baseline);
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(sub.id);
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_status_filter() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::status(DialogStatus::WaitingOperator),
            ..Default::default()
        };
        let sub = manager.subscribe_with(config, empty_baseline);
        let _baseline = sub.recv_timeout(Duration::from_millis(100)).unwrap();

        // Claimed dialog arrives as a left-view notice, not an upsert.
        manager.broadcast_upserted(&make_dialog(1, DialogStatus::Claimed));
        // Waiting dialog delivered as an upsert.
        manager.broadcast_upserted(&make_dialog(2, DialogStatus::WaitingOperator));

        let update = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(update, FeedUpdate::DialogLeftView { id: DialogId(1) });

        let update = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        match update {
            FeedUpdate::DialogUpserted { dialog } => assert_eq!(dialog.id, DialogId(2)),
            other => panic!("Expected DialogUpserted, got {:?}", other),
        }
    }

    #[test]
    fn test_dialog_leaving_filter_evicts_held_row() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::status(DialogStatus::WaitingOperator),
            ..Default::default()
        };
        let held = make_dialog(1, DialogStatus::WaitingOperator);
        let sub = manager.subscribe_with(config, || {
            (vec![held.clone()], ConnectionState::Synced)
        });
        let _baseline = sub.recv_timeout(Duration::from_millis(100)).unwrap();

        // The dialog gets claimed; this subscriber no longer matches it but
        // still holds the waiting row, so it must be told to drop it.
        let mut claimed = held;
        claimed.status = DialogStatus::Claimed;
        claimed.version = Version(2);
        manager.broadcast_upserted(&claimed);

        let update = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(update, FeedUpdate::DialogLeftView { id: DialogId(1) });
    }

    #[test]
    fn test_closed_passes_every_filter() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::status(DialogStatus::WaitingOperator),
            ..Default::default()
        };
        let sub = manager.subscribe_with(config, empty_baseline);
        let _baseline = sub.recv_timeout(Duration::from_millis(100)).unwrap();

        manager.broadcast_closed(DialogId(7));

        let update = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(update, FeedUpdate::DialogClosed { id: DialogId(7) });
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            buffer_size: 2,
            ..Default::default()
        };
        let _sub = manager.subscribe_with(config, empty_baseline);

        // Flood without draining; the baseline already occupies one slot.
        for i in 0..10 {
            manager.broadcast_upserted(&make_dialog(i, DialogStatus::WaitingOperator));
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_reseed_snapshot_is_filtered_per_subscriber() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            filter: SubscriptionFilter::status(DialogStatus::WaitingOperator),
            ..Default::default()
        };
        let sub = manager.subscribe_with(config, empty_baseline);
        let _baseline = sub.recv_timeout(Duration::from_millis(100)).unwrap();

        let dialogs = vec![
            make_dialog(1, DialogStatus::WaitingOperator),
            make_dialog(2, DialogStatus::Claimed),
        ];
        manager.broadcast_snapshot(&dialogs, ConnectionState::Synced);

        let update = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        match update {
            FeedUpdate::Snapshot { dialogs, .. } => {
                assert_eq!(dialogs.len(), 1);
                assert_eq!(dialogs[0].id, DialogId(1));
            }
            other => panic!("Expected Snapshot, got {:?}", other),
        }
    }
}
