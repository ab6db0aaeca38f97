//! Wire messages delivered by an event channel.

use crate::error::{FeedError, Result};
use crate::types::FeedEvent;
use serde::{Deserialize, Serialize};

/// Why the transport lost its connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectCause {
    /// Server closed the channel.
    ServerClosed,
    /// Transport-level failure (socket error, timeout).
    Transport,
    /// The session token was rejected at connect time.
    Unauthorized,
}

/// One message on the event channel: either a dialog lifecycle event or a
/// connectivity transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// A dialog lifecycle event.
    Event(FeedEvent),

    /// The transport (re)established its connection. The current epoch's
    /// events are no longer trusted; a fresh seed follows.
    Connected,

    /// The transport is attempting to reconnect.
    Reconnecting,

    /// The transport lost its connection.
    Disconnected { cause: DisconnectCause },
}

impl ChannelMessage {
    /// Decode a single wire message.
    ///
    /// A failure here affects only this message; callers drop it and keep
    /// the stream alive.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| FeedError::MalformedEvent(e.to_string()))
    }
}
