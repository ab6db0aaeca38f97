//! Event channel contract consumed by the feed engine.
//!
//! The engine does not own a transport. It consumes any bidirectional
//! channel that can deliver [`ChannelMessage`]s (lifecycle events plus
//! connectivity signals) and accept a resync request after a detected gap.
//!
//! Delivery assumptions within one connection epoch: at least once,
//! possibly reordered. Across a reconnect: none at all, which is why every
//! reconnect is followed by a fresh snapshot seed.
//!
//! [`MemoryChannel`] is an in-process adapter over a bounded channel, used
//! by the test suite and by embedders that bridge their own websocket
//! client into the engine.

mod memory;
mod types;

pub use memory::{memory_channel, ChannelDriver, MemoryChannel};
pub use types::{ChannelMessage, DisconnectCause};

use crate::error::Result;
use std::time::Duration;

/// A connected event stream, as seen by the engine.
pub trait EventChannel: Send {
    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` on timeout and `Err(ChannelClosed)` once the
    /// transport has shut down for good.
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<ChannelMessage>>;

    /// Ask the transport layer to arrange a fresh snapshot trigger, e.g.
    /// after a sequence gap. Best effort.
    fn request_resync(&self);
}
