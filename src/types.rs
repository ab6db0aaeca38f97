//! Core types for the dialog feed engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unique identifier for a dialog.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DialogId(pub u64);

impl fmt::Debug for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DialogId({})", self.0)
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an operator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub u64);

impl fmt::Debug for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorId({})", self.0)
    }
}

/// Per-dialog revision counter. Orders conflicting updates to one dialog.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version(pub u64);

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Server-assigned sequence number on the event stream, monotonic per
/// connection. Independent of [`Version`]; used only for gap detection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceVersion(pub u64);

impl fmt::Debug for SourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sv({})", self.0)
    }
}

/// Marker for one connection attempt. A seed carrying a stale epoch is
/// discarded, so an in-flight snapshot can never overwrite a newer one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct SyncEpoch(pub u64);

impl fmt::Debug for SyncEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }

    /// This timestamp shifted forward by a duration.
    pub fn plus(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_add(d.as_micros() as i64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Queue status of a dialog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStatus {
    WaitingOperator,
    Claimed,
    Closed,
}

impl DialogStatus {
    /// Wire value, as used in the snapshot endpoint's `status` query.
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogStatus::WaitingOperator => "waiting_operator",
            DialogStatus::Claimed => "claimed",
            DialogStatus::Closed => "closed",
        }
    }
}

/// One operator-facing conversation in the queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: DialogId,

    pub status: DialogStatus,

    /// When the last message arrived. Monotonic per dialog across accepted
    /// updates.
    pub last_message_at: Timestamp,

    /// Revision counter assigned by the server.
    pub version: Version,

    /// Operator currently handling the dialog, if claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_operator: Option<OperatorId>,
}

/// Dialog payload carried by a feed event. Full for `created` events,
/// possibly partial otherwise; `id` and `version` are always present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogPatch {
    pub id: DialogId,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DialogStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_operator: Option<OperatorId>,
}

impl DialogPatch {
    /// Patch carrying every field of a dialog.
    pub fn full(dialog: &Dialog) -> Self {
        Self {
            id: dialog.id,
            version: dialog.version,
            status: Some(dialog.status),
            last_message_at: Some(dialog.last_message_at),
            assigned_operator: dialog.assigned_operator,
        }
    }

    /// Materialize a full dialog from this patch, if it carries enough
    /// fields. `created` events are expected to be full.
    pub fn into_dialog(self) -> Option<Dialog> {
        Some(Dialog {
            id: self.id,
            status: self.status?,
            last_message_at: self.last_message_at?,
            version: self.version,
            assigned_operator: self.assigned_operator,
        })
    }

    /// Merge changed fields into an existing dialog and bump its version.
    /// `last_message_at` never moves backwards.
    pub fn merge_into(&self, dialog: &mut Dialog) {
        dialog.version = self.version;
        if let Some(status) = self.status {
            dialog.status = status;
        }
        if let Some(at) = self.last_message_at {
            if at > dialog.last_message_at {
                dialog.last_message_at = at;
            }
        }
        if let Some(op) = self.assigned_operator {
            dialog.assigned_operator = Some(op);
        }
    }
}

/// Lifecycle change kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Claimed,
    Closed,
}

/// One lifecycle change on the event stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub kind: EventKind,
    pub dialog: DialogPatch,
    pub source_version: SourceVersion,
}

/// Why the connection is degraded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// Discontinuity detected in the stream's sequence numbers.
    Gap,
    /// The transport reported a connectivity problem.
    ChannelLost,
}

/// Connectivity of the feed, as seen by consumers.
///
/// `Synced` is the only state in which the view is guaranteed consistent
/// with the server's current truth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Synced,
    Degraded { reason: DegradeReason },
}

/// Constraint for the snapshot endpoint. Applied by the server; the loader
/// never re-filters results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    pub status: Option<DialogStatus>,
}

impl SnapshotFilter {
    /// Only dialogs waiting for a human.
    pub fn waiting_operator() -> Self {
        Self {
            status: Some(DialogStatus::WaitingOperator),
        }
    }
}

/// Feed engine configuration.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// How long a closed dialog is kept as a tombstone to absorb duplicate
    /// or reordered close events.
    pub tombstone_grace: Duration,

    /// How long an event for an unknown dialog id is buffered before being
    /// dropped.
    pub pending_ttl: Duration,

    /// Max buffered events for unknown dialog ids, across all ids. Oldest
    /// entries are evicted first.
    pub pending_max: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tombstone_grace: Duration::from_secs(30),
            pending_ttl: Duration::from_secs(60),
            pending_max: 256,
        }
    }
}
