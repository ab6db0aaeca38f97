//! The feed store: one authoritative, reconciled view of the dialog queue.

use crate::error::{FeedError, Result};
use crate::types::{
    ConnectionState, DegradeReason, Dialog, DialogId, DialogPatch, DialogStatus, EventKind,
    FeedConfig, FeedEvent, SourceVersion, SyncEpoch, Timestamp,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Outcome of applying one stream event.
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    /// Accepted; the dialog was inserted or updated to this state.
    Applied(Dialog),

    /// Accepted; the dialog was tombstoned and left the view.
    Closed(DialogId),

    /// Stale or duplicate revision. No-op.
    Stale,

    /// Unknown dialog id; buffered until the id appears.
    Buffered,

    /// The store is not in `Synced` state; the event was dropped. The next
    /// seed is authoritative for anything missed.
    Untrusted,

    /// A `created` event lacked the fields needed to materialize a dialog
    /// and was dropped.
    Malformed,

    /// A sequence gap was detected. The connection is now degraded and the
    /// caller must re-seed from a fresh snapshot.
    ResyncRequired,
}

/// A live or tombstoned dialog entry.
struct Entry {
    dialog: Dialog,
    /// Set once the dialog is closed; purged after this instant.
    tombstone_expiry: Option<Timestamp>,
}

/// An event that arrived before its dialog id was known.
struct PendingEvent {
    event: FeedEvent,
    received_at: Timestamp,
}

/// Store state guarded by the single writer lock.
struct Inner {
    entries: HashMap<DialogId, Entry>,
    /// Arrival-ordered buffer of events for unknown ids; filtered by id on
    /// replay, oldest evicted when full.
    pending: VecDeque<PendingEvent>,
    /// Last sequence number accepted on this connection epoch.
    last_source: Option<SourceVersion>,
    epoch: SyncEpoch,
    connection: ConnectionState,
}

/// Maintains one consistent in-memory view of the dialog queue.
///
/// All mutations (`seed`, `apply`, `purge_expired_tombstones`) are
/// serialized behind one mutex; `apply` is a pure in-memory transition and
/// safe to run on the event-delivery thread directly.
pub struct FeedStore {
    config: FeedConfig,
    inner: Mutex<Inner>,
}

impl FeedStore {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                pending: VecDeque::new(),
                last_source: None,
                epoch: SyncEpoch(0),
                connection: ConnectionState::Disconnected,
            }),
        }
    }

    /// Start a new connection epoch.
    ///
    /// Events are not trusted until the matching [`seed`](Self::seed)
    /// lands; a seed carrying an older epoch is discarded.
    pub fn begin_sync(&self) -> SyncEpoch {
        let mut inner = self.inner.lock();
        inner.epoch = SyncEpoch(inner.epoch.0 + 1);
        inner.connection = ConnectionState::Connecting;
        debug!(epoch = inner.epoch.0, "beginning sync");
        inner.epoch
    }

    /// Atomically replace the live set with a fresh snapshot.
    ///
    /// Clears prior-epoch entries and tombstones, resets the sequence
    /// cursor, replays still-fresh buffered events for ids the snapshot
    /// contains, and transitions to `Synced`. Fails with `Superseded` if a
    /// newer `begin_sync` has happened since `epoch` was issued.
    pub fn seed(&self, epoch: SyncEpoch, dialogs: Vec<Dialog>, now: Timestamp) -> Result<()> {
        let mut inner = self.inner.lock();
        if epoch != inner.epoch {
            debug!(
                stale = epoch.0,
                current = inner.epoch.0,
                "discarding superseded snapshot"
            );
            return Err(FeedError::Superseded(epoch));
        }

        inner.entries.clear();
        inner.last_source = None;
        for dialog in dialogs {
            let tombstone_expiry = (dialog.status == DialogStatus::Closed)
                .then(|| now.plus(self.config.tombstone_grace));
            inner.entries.insert(
                dialog.id,
                Entry {
                    dialog,
                    tombstone_expiry,
                },
            );
        }

        inner.connection = ConnectionState::Synced;
        Self::prune_pending(&mut inner, now, self.config.pending_ttl);

        // Replay buffered events whose ids the snapshot brought in.
        let pending = std::mem::take(&mut inner.pending);
        for p in pending {
            if inner.entries.contains_key(&p.event.dialog.id) {
                Self::apply_event(&self.config, &mut inner, &p.event, now);
            } else {
                inner.pending.push_back(p);
            }
        }

        info!(
            epoch = epoch.0,
            dialogs = inner.entries.len(),
            "seeded from snapshot"
        );
        Ok(())
    }

    /// Apply one stream event.
    ///
    /// Never fails: stale, duplicate, and untrusted events are discarded
    /// individually and reported through the outcome.
    pub fn apply(&self, event: &FeedEvent, now: Timestamp) -> ApplyOutcome {
        let mut inner = self.inner.lock();

        if inner.connection != ConnectionState::Synced {
            debug!(id = %event.dialog.id, "dropping event while not synced");
            return ApplyOutcome::Untrusted;
        }

        // Gap detection on the per-connection sequence. A backwards or
        // duplicate sequence is reordered delivery and still processed (the
        // version rule dedupes); only a forward jump signals loss.
        match inner.last_source {
            None => inner.last_source = Some(event.source_version),
            Some(last) => {
                if event.source_version.0 > last.0 + 1 {
                    warn!(
                        expected = last.0 + 1,
                        got = event.source_version.0,
                        "sequence gap on event stream, resync required"
                    );
                    inner.connection = ConnectionState::Degraded {
                        reason: DegradeReason::Gap,
                    };
                    return ApplyOutcome::ResyncRequired;
                }
                if event.source_version.0 == last.0 + 1 {
                    inner.last_source = Some(event.source_version);
                }
            }
        }

        Self::apply_event(&self.config, &mut inner, event, now)
    }

    /// Remove tombstones whose grace period has elapsed, plus expired
    /// pending entries. Returns how many dialogs were purged.
    pub fn purge_expired_tombstones(&self, now: Timestamp) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| !matches!(entry.tombstone_expiry, Some(expiry) if expiry <= now));
        let purged = before - inner.entries.len();
        if purged > 0 {
            debug!(purged, "purged expired tombstones");
        }
        Self::prune_pending(&mut inner, now, self.config.pending_ttl);
        purged
    }

    /// Non-tombstoned dialogs, most recent message first, ties broken by id
    /// ascending for determinism.
    pub fn current_view(&self) -> Vec<Dialog> {
        let inner = self.inner.lock();
        Self::view_of(&inner)
    }

    /// The view and the connection state, read under one lock. This is the
    /// consistent baseline handed to a new subscriber.
    pub fn view_with_state(&self) -> (Vec<Dialog>, ConnectionState) {
        let inner = self.inner.lock();
        (Self::view_of(&inner), inner.connection)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock().connection
    }

    /// The transport lost its connection. Events are no longer trusted
    /// until the next seed.
    pub fn mark_disconnected(&self) {
        self.inner.lock().connection = ConnectionState::Disconnected;
    }

    /// The transport is degraded (reconnecting, or a detected gap).
    pub fn degrade(&self, reason: DegradeReason) {
        self.inner.lock().connection = ConnectionState::Degraded { reason };
    }

    // --- Internals (called with the lock held) ---

    fn view_of(inner: &Inner) -> Vec<Dialog> {
        let mut dialogs: Vec<Dialog> = inner
            .entries
            .values()
            .filter(|e| e.tombstone_expiry.is_none())
            .map(|e| e.dialog.clone())
            .collect();
        dialogs.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then(a.id.cmp(&b.id))
        });
        dialogs
    }

    /// Version-rule application, shared by the live path and pending
    /// replay. Does not touch the sequence cursor.
    fn apply_event(
        config: &FeedConfig,
        inner: &mut Inner,
        event: &FeedEvent,
        now: Timestamp,
    ) -> ApplyOutcome {
        let id = event.dialog.id;
        let patch = Self::effective_patch(event);

        if let Some(entry) = inner.entries.get_mut(&id) {
            if patch.version < entry.dialog.version {
                debug!(%id, incoming = patch.version.0, stored = entry.dialog.version.0,
                    "discarding stale event");
                return ApplyOutcome::Stale;
            }
            if patch.version == entry.dialog.version {
                // Duplicate delivery of a known revision. A tombstoned entry
                // already carries its close's version, so a replayed close
                // lands here and cannot extend the grace window.
                return ApplyOutcome::Stale;
            }

            return match event.kind {
                EventKind::Closed => {
                    entry.dialog.version = patch.version;
                    entry.dialog.status = DialogStatus::Closed;
                    if entry.tombstone_expiry.is_none() {
                        entry.tombstone_expiry = Some(now.plus(config.tombstone_grace));
                    }
                    ApplyOutcome::Closed(id)
                }
                EventKind::Created | EventKind::Updated | EventKind::Claimed => {
                    // A newer non-close revision on a tombstoned entry means
                    // the server reopened the dialog.
                    if entry.tombstone_expiry.take().is_some() {
                        info!(%id, "reopening tombstoned dialog");
                    }
                    patch.merge_into(&mut entry.dialog);
                    ApplyOutcome::Applied(entry.dialog.clone())
                }
            };
        }

        // Unknown id.
        match event.kind {
            EventKind::Created => match patch.clone().into_dialog() {
                Some(dialog) => {
                    inner.entries.insert(
                        id,
                        Entry {
                            dialog,
                            tombstone_expiry: None,
                        },
                    );
                    Self::replay_pending_for(config, inner, id, now)
                }
                None => {
                    warn!(%id, "dropping created event with partial payload");
                    ApplyOutcome::Malformed
                }
            },
            EventKind::Updated | EventKind::Claimed | EventKind::Closed => {
                Self::buffer_pending(config, inner, event, now);
                ApplyOutcome::Buffered
            }
        }
    }

    /// Claimed/closed events imply a status even when the patch omits one.
    fn effective_patch(event: &FeedEvent) -> DialogPatch {
        let mut patch = event.dialog.clone();
        if patch.status.is_none() {
            patch.status = match event.kind {
                EventKind::Claimed => Some(DialogStatus::Claimed),
                EventKind::Closed => Some(DialogStatus::Closed),
                EventKind::Created | EventKind::Updated => None,
            };
        }
        patch
    }

    fn buffer_pending(config: &FeedConfig, inner: &mut Inner, event: &FeedEvent, now: Timestamp) {
        if inner.pending.len() >= config.pending_max {
            if let Some(evicted) = inner.pending.pop_front() {
                warn!(id = %evicted.event.dialog.id, "pending buffer full, evicting oldest");
            }
        }
        debug!(id = %event.dialog.id, "buffering event for unknown dialog");
        inner.pending.push_back(PendingEvent {
            event: event.clone(),
            received_at: now,
        });
    }

    /// Replay buffered events for an id that just appeared. The final entry
    /// state decides the outcome reported for the insert.
    fn replay_pending_for(
        config: &FeedConfig,
        inner: &mut Inner,
        id: DialogId,
        now: Timestamp,
    ) -> ApplyOutcome {
        let ttl = config.pending_ttl;
        let pending = std::mem::take(&mut inner.pending);
        let mut replay = Vec::new();
        for p in pending {
            if p.received_at.plus(ttl) <= now {
                continue; // expired
            }
            if p.event.dialog.id == id {
                replay.push(p.event);
            } else {
                inner.pending.push_back(p);
            }
        }
        for event in &replay {
            Self::apply_event(config, inner, event, now);
        }

        match inner.entries.get(&id) {
            Some(entry) if entry.tombstone_expiry.is_some() => ApplyOutcome::Closed(id),
            Some(entry) => ApplyOutcome::Applied(entry.dialog.clone()),
            None => ApplyOutcome::Stale,
        }
    }

    fn prune_pending(inner: &mut Inner, now: Timestamp, ttl: std::time::Duration) {
        inner.pending.retain(|p| p.received_at.plus(ttl) > now);
    }
}
