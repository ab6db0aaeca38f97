//! In-process event channel over a bounded crossbeam buffer.

use super::types::ChannelMessage;
use super::EventChannel;
use crate::error::{FeedError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Create a connected in-process channel pair.
///
/// The [`ChannelDriver`] side is held by the transport (or a test); the
/// [`MemoryChannel`] side is consumed by the engine.
pub fn memory_channel(buffer: usize) -> (ChannelDriver, MemoryChannel) {
    let (msg_tx, msg_rx) = bounded(buffer);
    let (resync_tx, resync_rx) = bounded(1);

    (
        ChannelDriver {
            sender: msg_tx,
            resync_requests: resync_rx,
        },
        MemoryChannel {
            receiver: msg_rx,
            resync: resync_tx,
        },
    )
}

/// Producer half: pushes messages into the channel and observes resync
/// requests coming back from the engine.
pub struct ChannelDriver {
    sender: Sender<ChannelMessage>,
    resync_requests: Receiver<()>,
}

impl ChannelDriver {
    /// Push a message. Returns false if the consumer is gone or the buffer
    /// is full.
    pub fn send(&self, message: ChannelMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Whether the engine has asked for a fresh snapshot since the last
    /// check.
    pub fn resync_requested(&self) -> bool {
        self.resync_requests.try_recv().is_ok()
    }
}

/// Consumer half, handed to the engine.
pub struct MemoryChannel {
    receiver: Receiver<ChannelMessage>,
    resync: Sender<()>,
}

impl EventChannel for MemoryChannel {
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<ChannelMessage>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(FeedError::ChannelClosed),
        }
    }

    fn request_resync(&self) {
        // Coalesces: one pending request is enough.
        let _ = self.resync.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let (driver, channel) = memory_channel(8);

        assert!(driver.send(ChannelMessage::Connected));
        let msg = channel.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(msg, Some(ChannelMessage::Connected));

        // Nothing else queued.
        let msg = channel.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(msg, None);
    }

    #[test]
    fn test_closed_when_driver_dropped() {
        let (driver, channel) = memory_channel(8);
        drop(driver);

        let result = channel.recv_timeout(Duration::from_millis(10));
        assert!(matches!(result, Err(FeedError::ChannelClosed)));
    }

    #[test]
    fn test_resync_requests_coalesce() {
        let (driver, channel) = memory_channel(8);

        channel.request_resync();
        channel.request_resync();
        channel.request_resync();

        assert!(driver.resync_requested());
        assert!(!driver.resync_requested());
    }

    #[test]
    fn test_full_buffer_rejects() {
        let (driver, _channel) = memory_channel(1);

        assert!(driver.send(ChannelMessage::Connected));
        assert!(!driver.send(ChannelMessage::Reconnecting));
    }
}
