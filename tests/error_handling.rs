//! Error handling and edge case tests.

use dialog_feed::{
    memory_channel, ChannelMessage, ConnectionState, Dialog, DialogId, DialogStatus, FeedError,
    FeedSession, Result, SnapshotFilter, SnapshotLoader, SubscriptionConfig, Timestamp, Version,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn dialog(id: u64, version: u64, at: i64) -> Dialog {
    Dialog {
        id: DialogId(id),
        status: DialogStatus::WaitingOperator,
        last_message_at: Timestamp(at),
        version: Version(version),
        assigned_operator: None,
    }
}

// --- Loader failures ---

struct UnauthorizedLoader;

impl SnapshotLoader for UnauthorizedLoader {
    fn load(&self, _filter: &SnapshotFilter) -> Result<Vec<Dialog>> {
        Err(FeedError::Unauthorized)
    }
}

/// Fails a set number of times, then serves a snapshot.
struct FlakyLoader {
    failures_left: Mutex<u32>,
    dialogs: Vec<Dialog>,
}

impl SnapshotLoader for FlakyLoader {
    fn load(&self, _filter: &SnapshotFilter) -> Result<Vec<Dialog>> {
        let mut left = self.failures_left.lock();
        if *left > 0 {
            *left -= 1;
            return Err(FeedError::Server { status: 503 });
        }
        Ok(self.dialogs.clone())
    }
}

#[test]
fn test_unauthorized_is_fatal_to_sync() {
    let session = FeedSession::new(UnauthorizedLoader);
    let result = session.sync(&SnapshotFilter::default());
    assert!(matches!(result, Err(FeedError::Unauthorized)));
    // No partial state leaked.
    assert!(session.current_view().is_empty());
}

#[test]
fn test_unauthorized_aborts_driver() {
    let session = Arc::new(FeedSession::new(UnauthorizedLoader));
    let (driver, channel) = memory_channel(8);
    let handle = {
        let session = Arc::clone(&session);
        std::thread::spawn(move || session.drive(&channel, &SnapshotFilter::default()))
    };

    driver.send(ChannelMessage::Connected);

    let result = handle.join().unwrap();
    assert!(matches!(result, Err(FeedError::Unauthorized)));
}

#[test]
fn test_transient_failures_are_retried_by_driver() {
    let session = Arc::new(FeedSession::new(FlakyLoader {
        failures_left: Mutex::new(1),
        dialogs: vec![dialog(1, 1, 100)],
    }));
    let (driver, channel) = memory_channel(8);
    let handle = {
        let session = Arc::clone(&session);
        std::thread::spawn(move || session.drive(&channel, &SnapshotFilter::default()))
    };

    driver.send(ChannelMessage::Connected);

    // One 503, one retry, then seeded.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while session.connection_state() != ConnectionState::Synced {
        assert!(std::time::Instant::now() < deadline, "never seeded");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(session.current_view(), vec![dialog(1, 1, 100)]);

    drop(driver);
    handle.join().unwrap().unwrap();
}

// --- Malformed stream messages ---

#[test]
fn test_malformed_message_does_not_poison_the_stream() {
    // A transport bridging raw frames drops what it cannot decode and keeps
    // going; the next well-formed frame is unaffected.
    let bad = ChannelMessage::from_json(r#"{"type": "event", "kind": 42}"#);
    assert!(matches!(bad, Err(FeedError::MalformedEvent(_))));

    let good = ChannelMessage::from_json(
        r#"{"type": "event", "kind": "created",
            "dialog": {"id": 1, "version": 1, "status": "waiting_operator",
                       "last_message_at": 100},
            "source_version": 1}"#,
    )
    .unwrap();

    let session = FeedSession::new(FlakyLoader {
        failures_left: Mutex::new(0),
        dialogs: vec![],
    });
    session.sync(&SnapshotFilter::default()).unwrap();
    session.handle_message(good);
    assert_eq!(session.current_view(), vec![dialog(1, 1, 100)]);
}

// --- Consumer isolation ---

#[test]
fn test_slow_consumer_never_blocks_apply() {
    let session = FeedSession::new(FlakyLoader {
        failures_left: Mutex::new(0),
        dialogs: vec![],
    });
    session.sync(&SnapshotFilter::default()).unwrap();

    // A subscriber that never drains, with a tiny buffer.
    let _sub = session.subscribe(SubscriptionConfig {
        buffer_size: 1,
        ..Default::default()
    });

    // Flood; every apply must complete and the view must stay correct.
    for i in 0..100u64 {
        let d = dialog(i, 1, i as i64);
        session.handle_message(ChannelMessage::Event(dialog_feed::FeedEvent {
            kind: dialog_feed::EventKind::Created,
            dialog: dialog_feed::DialogPatch::full(&d),
            source_version: dialog_feed::SourceVersion(i + 1),
        }));
    }
    assert_eq!(session.current_view().len(), 100);
}

#[test]
fn test_unsubscribed_consumer_stops_receiving() {
    let session = FeedSession::new(FlakyLoader {
        failures_left: Mutex::new(0),
        dialogs: vec![],
    });
    session.sync(&SnapshotFilter::default()).unwrap();

    let sub = session.subscribe(SubscriptionConfig::default());
    let _baseline = sub.try_recv().unwrap();
    session.unsubscribe(sub.id);

    match sub.try_recv().unwrap() {
        dialog_feed::FeedUpdate::Dropped { reason } => {
            assert_eq!(reason, dialog_feed::DropReason::Unsubscribed);
        }
        other => panic!("Expected Dropped, got {:?}", other),
    }
}
