//! Snapshot loading from the dialog listing endpoint.

use crate::error::{FeedError, Result};
use crate::types::{Dialog, DialogId, DialogStatus, OperatorId, SnapshotFilter, Timestamp, Version};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Fetches the current set of queued dialogs. Single-shot: no retries, no
/// caching; the caller owns retry policy and epoch bookkeeping.
pub trait SnapshotLoader: Send + Sync {
    /// Load the dialogs matching `filter`, in server-defined order.
    ///
    /// The filter is applied by the server and trusted; results are not
    /// re-filtered here.
    fn load(&self, filter: &SnapshotFilter) -> Result<Vec<Dialog>>;
}

/// Dialog record as served by `GET /api/dialogs`.
#[derive(Debug, Deserialize)]
struct WireDialog {
    id: u64,
    status: DialogStatus,
    /// Microseconds since epoch.
    last_message_at: i64,
    version: u64,
    #[serde(default)]
    assigned_operator_id: Option<u64>,
}

impl From<WireDialog> for Dialog {
    fn from(wire: WireDialog) -> Self {
        Dialog {
            id: DialogId(wire.id),
            status: wire.status,
            last_message_at: Timestamp(wire.last_message_at),
            version: Version(wire.version),
            assigned_operator: wire.assigned_operator_id.map(OperatorId),
        }
    }
}

/// Loader backed by the REST snapshot endpoint, authenticated with a bearer
/// token.
pub struct HttpSnapshotLoader {
    client: Client,
    base_url: String,
    token: String,
}

/// Request timeout for one snapshot fetch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpSnapshotLoader {
    /// Create a loader for `{base_url}/api/dialogs`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

impl SnapshotLoader for HttpSnapshotLoader {
    fn load(&self, filter: &SnapshotFilter) -> Result<Vec<Dialog>> {
        let url = format!("{}/api/dialogs", self.base_url);
        let mut request = self.client.get(&url).bearer_auth(&self.token);
        if let Some(status) = filter.status {
            request = request.query(&[("status", status.as_str())]);
        }

        let response = request
            .send()
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status));
        }

        let wire: Vec<WireDialog> = response
            .json()
            .map_err(|e| FeedError::Network(format!("invalid snapshot body: {e}")))?;
        debug!(dialogs = wire.len(), "snapshot fetched");
        Ok(wire.into_iter().map(Dialog::from).collect())
    }
}

/// Map a non-2xx response to the error taxonomy: auth failures are fatal,
/// everything else is retryable by the caller.
fn error_for_status(status: StatusCode) -> FeedError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FeedError::Unauthorized,
        other => FeedError::Server {
            status: other.as_u16(),
        },
    }
}
