//! Error types for the feed engine.

use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Token was rejected. Fatal to the session; never retried internally.
    #[error("Unauthorized: snapshot endpoint rejected the session token")]
    Unauthorized,

    /// Transport-level failure reaching the snapshot endpoint. Retryable by
    /// the owning caller with backoff.
    #[error("Network error: {0}")]
    Network(String),

    /// Snapshot endpoint answered with a non-2xx status. Retryable by the
    /// owning caller with backoff.
    #[error("Server error: status {status}")]
    Server { status: u16 },

    /// A single stream message could not be decoded. The message is dropped;
    /// the stream and the view are unaffected.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// The event channel was closed by the transport.
    #[error("Event channel closed")]
    ChannelClosed,

    /// A snapshot completed for an epoch that has since been superseded by a
    /// newer connection attempt. Its result was discarded.
    #[error("Snapshot superseded by a newer sync (epoch {0:?})")]
    Superseded(crate::types::SyncEpoch),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::MalformedEvent(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
