pub mod channel;
pub mod ingest;

pub use channel::RelayChannel;
pub use ingest::IngestionRelay;

use crate::metrics::snapshot::MetricsSnapshot;
use crate::storage::VisitRecord;
use tokio::sync::{mpsc, oneshot};

/// Write-path state pushed to any listening display surface.
///
/// A transient fan-out signal, not stored state: senders never block or fail
/// when no receiver is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingState {
    Idle,
    Posting,
    PostedOk,
    PostedError(String),
}

impl PostingState {
    /// A posting attempt finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostingState::PostedOk | PostingState::PostedError(_))
    }
}

/// Message envelope crossing from the page context to the privileged side.
/// Each request carries its own reply slot; delivery is at-most-once.
#[derive(Debug)]
pub enum RelayRequest {
    CollectMetrics {
        snapshot: MetricsSnapshot,
        reply: oneshot::Sender<std::result::Result<VisitRecord, String>>,
    },
    Ping {
        reply: oneshot::Sender<()>,
    },
}

/// Build both ends of the relay: the page-context sender half and the request
/// stream the ingestion relay drains.
pub fn channel(capacity: usize) -> (RelayChannel, mpsc::Receiver<RelayRequest>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RelayChannel::new(tx), rx)
}
