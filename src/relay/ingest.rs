use crate::metrics::snapshot::MetricsSnapshot;
use crate::relay::{PostingState, RelayRequest};
use crate::storage::{VisitRecord, VisitStore};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Privileged side of the relay: drains snapshot requests, forwards them to
/// the storage service, and broadcasts posting state around each write.
///
/// Broadcasts are best-effort: a zero-receiver send is silently discarded,
/// and no failure escapes the drain task.
pub struct IngestionRelay {
    store: Arc<dyn VisitStore>,
    posting_tx: broadcast::Sender<PostingState>,
}

impl IngestionRelay {
    pub fn new(store: Arc<dyn VisitStore>) -> Self {
        let (posting_tx, _) = broadcast::channel(16);
        Self { store, posting_tx }
    }

    /// Subscribe a display surface to posting-state broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<PostingState> {
        self.posting_tx.subscribe()
    }

    pub fn spawn(self, mut requests: mpsc::Receiver<RelayRequest>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                match request {
                    RelayRequest::Ping { reply } => {
                        let _ = reply.send(());
                    }
                    RelayRequest::CollectMetrics { snapshot, reply } => {
                        self.handle_snapshot(snapshot, reply).await;
                    }
                }
            }
            log::debug!("ingestion relay shutting down");
        })
    }

    async fn handle_snapshot(
        &self,
        snapshot: MetricsSnapshot,
        reply: oneshot::Sender<Result<VisitRecord, String>>,
    ) {
        self.notify(PostingState::Posting);

        match self.store.record_visit(&snapshot).await {
            Ok(record) => {
                log::info!("recorded visit {} for {}", record.id, record.url);
                self.notify(PostingState::PostedOk);
                let _ = reply.send(Ok(record));
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("failed to record visit for {}: {}", snapshot.url, message);
                self.notify(PostingState::PostedError(message.clone()));
                let _ = reply.send(Err(message));
            }
        }
    }

    /// Best-effort notify: never throws, even with nobody listening.
    fn notify(&self, state: PostingState) {
        let _ = self.posting_tx.send(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::relay;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FailingStore;

    #[async_trait]
    impl VisitStore for FailingStore {
        async fn record_visit(&self, _: &MetricsSnapshot) -> crate::Result<VisitRecord> {
            Err(Error::NetworkUnreachable("connection refused".to_string()))
        }

        async fn latest_metrics(&self, _: &str) -> crate::Result<Option<crate::storage::PageMetrics>> {
            Ok(None)
        }

        async fn visit_history(&self, _: &str, _: u32) -> crate::Result<Vec<VisitRecord>> {
            Ok(Vec::new())
        }
    }

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            url: "https://a.test/".to_string(),
            link_count: 3,
            word_count: 120,
            image_count: 2,
            captured_at: Utc::now(),
            tz_offset_hours: 0.0,
        }
    }

    #[tokio::test]
    async fn successful_write_broadcasts_posting_then_ok() {
        let (channel, rx) = relay::channel(4);
        let ingest = IngestionRelay::new(Arc::new(MemoryStore::new()));
        let mut posting = ingest.subscribe();
        ingest.spawn(rx);

        let record = channel.send(snapshot()).await.unwrap();
        assert_eq!(record.url, "https://a.test");

        assert_eq!(posting.recv().await.unwrap(), PostingState::Posting);
        assert_eq!(posting.recv().await.unwrap(), PostingState::PostedOk);
    }

    #[tokio::test]
    async fn failed_write_broadcasts_error_and_rejects_caller() {
        let (channel, rx) = relay::channel(4);
        let ingest = IngestionRelay::new(Arc::new(FailingStore));
        let mut posting = ingest.subscribe();
        ingest.spawn(rx);

        let err = channel.send(snapshot()).await.unwrap_err();
        assert!(matches!(err, Error::Relay(_)));

        assert_eq!(posting.recv().await.unwrap(), PostingState::Posting);
        match posting.recv().await.unwrap() {
            PostingState::PostedError(msg) => assert!(msg.contains("connection refused")),
            other => panic!("expected PostedError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writes_succeed_with_no_broadcast_listener() {
        let (channel, rx) = relay::channel(4);
        let ingest = IngestionRelay::new(Arc::new(MemoryStore::new()));
        // No subscriber attached anywhere.
        ingest.spawn(rx);

        assert!(channel.send(snapshot()).await.is_ok());
    }
}
