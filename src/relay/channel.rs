use crate::error::{Error, Result};
use crate::metrics::snapshot::MetricsSnapshot;
use crate::relay::RelayRequest;
use crate::storage::VisitRecord;
use tokio::sync::{mpsc, oneshot};

/// Page-context half of the relay.
///
/// `send` is one-shot, at-most-once: no internal retry. A torn-down
/// privileged side (closed channel or dropped reply) surfaces as
/// `Error::ChannelClosed` so the caller can halt emission and start probing.
#[derive(Clone)]
pub struct RelayChannel {
    tx: mpsc::Sender<RelayRequest>,
}

impl RelayChannel {
    pub(crate) fn new(tx: mpsc::Sender<RelayRequest>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, snapshot: MetricsSnapshot) -> Result<VisitRecord> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RelayRequest::CollectMetrics {
                snapshot,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::ChannelClosed)?;

        match reply_rx.await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(message)) => Err(Error::Relay(message)),
            Err(_) => Err(Error::ChannelClosed),
        }
    }

    /// Lightweight liveness check: a ping round-trip.
    pub async fn probe(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(RelayRequest::Ping { reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.is_ok()
    }
}
