//! Feed session tying all components together.

use crate::channel::{ChannelMessage, DisconnectCause, EventChannel};
use crate::error::{FeedError, Result};
use crate::feed::{ApplyOutcome, FeedStore};
use crate::snapshot::SnapshotLoader;
use crate::subscriptions::{
    FeedSubscription, SubscriptionConfig, SubscriptionId, SubscriptionManager,
};
use crate::types::{
    ConnectionState, DegradeReason, Dialog, FeedConfig, FeedEvent, SnapshotFilter, Timestamp,
};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What the caller should do after handing a message to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    /// Nothing further needed.
    Handled,
    /// The view can no longer be trusted; run [`FeedSession::sync`].
    ResyncNeeded,
}

/// How long `drive` waits for a message before running periodic work.
const DRIVE_TICK: Duration = Duration::from_millis(250);

/// How often `drive` purges expired tombstones.
const PURGE_INTERVAL: Duration = Duration::from_secs(5);

/// Backoff between snapshot retries after a transient failure.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One operator session's live feed.
///
/// Owns the store, the subscription fan-out, and the snapshot loader.
/// Never a process-wide singleton: each connected operator session gets its
/// own instance, so sessions cannot cross-talk.
///
/// The session is driven from outside: either hand it a transport and call
/// [`drive`](Self::drive) on a dedicated thread, or push messages through
/// [`handle_message`](Self::handle_message) directly.
pub struct FeedSession<L: SnapshotLoader> {
    store: FeedStore,
    subscriptions: SubscriptionManager,
    loader: L,
}

impl<L: SnapshotLoader> FeedSession<L> {
    pub fn new(loader: L) -> Self {
        Self::with_config(loader, FeedConfig::default())
    }

    pub fn with_config(loader: L, config: FeedConfig) -> Self {
        Self {
            store: FeedStore::new(config),
            subscriptions: SubscriptionManager::new(),
            loader,
        }
    }

    // --- Sync ---

    /// Load a fresh snapshot and seed the store with it.
    ///
    /// The loader runs outside the store's critical section; the seed is
    /// tied to the epoch issued here, so a slower concurrent attempt can
    /// never overwrite a newer one (it fails with `Superseded`).
    ///
    /// `Unauthorized` is fatal to the session. `Network`/`Server` failures
    /// are left to the caller's retry policy.
    pub fn sync(&self, filter: &SnapshotFilter) -> Result<()> {
        let epoch = self.store.begin_sync();
        self.subscriptions
            .broadcast_connection(ConnectionState::Connecting);

        let dialogs = self.loader.load(filter)?;
        self.store.seed(epoch, dialogs, Timestamp::now())?;

        let (view, state) = self.store.view_with_state();
        self.subscriptions.broadcast_snapshot(&view, state);
        Ok(())
    }

    // --- Stream ---

    /// Feed one channel message through the store and fan out the result.
    pub fn handle_message(&self, message: ChannelMessage) -> SessionSignal {
        match message {
            ChannelMessage::Event(event) => self.handle_event(&event),

            ChannelMessage::Connected => {
                // Zero delivery guarantees across a reconnect: re-seed.
                info!("event channel connected, snapshot needed");
                SessionSignal::ResyncNeeded
            }

            ChannelMessage::Reconnecting => {
                self.store.degrade(DegradeReason::ChannelLost);
                self.subscriptions
                    .broadcast_connection(self.store.connection_state());
                SessionSignal::Handled
            }

            ChannelMessage::Disconnected { cause } => {
                if cause == DisconnectCause::Unauthorized {
                    warn!("event channel rejected the session token");
                }
                self.store.mark_disconnected();
                self.subscriptions
                    .broadcast_connection(ConnectionState::Disconnected);
                SessionSignal::Handled
            }
        }
    }

    fn handle_event(&self, event: &FeedEvent) -> SessionSignal {
        match self.store.apply(event, Timestamp::now()) {
            ApplyOutcome::Applied(dialog) => {
                self.subscriptions.broadcast_upserted(&dialog);
                SessionSignal::Handled
            }
            ApplyOutcome::Closed(id) => {
                self.subscriptions.broadcast_closed(id);
                SessionSignal::Handled
            }
            ApplyOutcome::ResyncRequired => {
                self.subscriptions
                    .broadcast_connection(self.store.connection_state());
                SessionSignal::ResyncNeeded
            }
            ApplyOutcome::Stale
            | ApplyOutcome::Buffered
            | ApplyOutcome::Untrusted
            | ApplyOutcome::Malformed => SessionSignal::Handled,
        }
    }

    /// Consume a channel until it closes, re-seeding on connect and on
    /// detected gaps. Intended for a dedicated transport thread.
    ///
    /// Transient snapshot failures are retried with a fixed backoff;
    /// `Unauthorized` aborts the session.
    pub fn drive<C: EventChannel>(&self, channel: &C, filter: &SnapshotFilter) -> Result<()> {
        let mut last_purge = Instant::now();

        loop {
            match channel.recv_timeout(DRIVE_TICK) {
                Ok(Some(message)) => {
                    if self.handle_message(message) == SessionSignal::ResyncNeeded {
                        channel.request_resync();
                        self.sync_until_seeded(filter)?;
                    }
                }
                Ok(None) => {}
                Err(FeedError::ChannelClosed) => {
                    info!("event channel closed, stopping session driver");
                    self.store.mark_disconnected();
                    self.subscriptions
                        .broadcast_connection(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            if last_purge.elapsed() >= PURGE_INTERVAL {
                self.purge_tick(Timestamp::now());
                last_purge = Instant::now();
            }
        }
    }

    /// Retry `sync` across transient failures. A superseded seed means a
    /// newer attempt owns the outcome, so it counts as done.
    fn sync_until_seeded(&self, filter: &SnapshotFilter) -> Result<()> {
        loop {
            match self.sync(filter) {
                Ok(()) => return Ok(()),
                Err(FeedError::Superseded(epoch)) => {
                    info!(epoch = epoch.0, "snapshot superseded, deferring to newer sync");
                    return Ok(());
                }
                Err(e @ FeedError::Unauthorized) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "snapshot failed, retrying");
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    /// Purge expired tombstones. Runs on the driver's timer; safe to call
    /// from any thread.
    pub fn purge_tick(&self, now: Timestamp) -> usize {
        self.store.purge_expired_tombstones(now)
    }

    // --- Consumers ---

    /// Attach a consumer. It immediately receives the current view as a
    /// `Snapshot`, then incremental updates.
    pub fn subscribe(&self, config: SubscriptionConfig) -> FeedSubscription {
        self.subscriptions
            .subscribe_with(config, || self.store.view_with_state())
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    /// The current consistent view (non-tombstoned dialogs, most recent
    /// first).
    pub fn current_view(&self) -> Vec<Dialog> {
        self.store.current_view()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.store.connection_state()
    }

    /// The snapshot loader this session was built with.
    pub fn loader(&self) -> &L {
        &self.loader
    }
}
