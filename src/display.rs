use crate::config::schema::PipelineConfig;
use crate::error::Error;
use crate::gate::is_restricted;
use crate::relay::PostingState;
use crate::storage::{PageMetrics, VisitRecord, VisitStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Read-path failure surfaced to the display, always retryable by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Unreachable(String),
    Rejected { status: u16, message: String },
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        true
    }

    fn from_error(e: &Error) -> Self {
        match e {
            Error::RemoteRejected { status, message } => SyncError::Rejected {
                status: *status,
                message: message.clone(),
            },
            other => SyncError::Unreachable(other.to_string()),
        }
    }
}

/// What one display panel shows. Rebuilt per fetch cycle; on a failed cycle
/// the previous data stays visible with `error` set (stale, not blank).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayViewModel {
    pub url: String,
    pub metrics: Option<PageMetrics>,
    pub visits: Vec<VisitRecord>,
    pub loading: bool,
    pub error: Option<SyncError>,
    pub no_data: bool,
}

enum SyncCommand {
    Bind(String),
    Refetch,
}

/// Keeps one panel's view model in sync with the storage service by polling
/// on a fixed interval, refetching immediately on posting-finished broadcasts,
/// and honoring manual refetches. In-flight results only apply while they are
/// still the newest request for the bound URL.
pub struct DisplaySynchronizer {
    commands: mpsc::Sender<SyncCommand>,
    view_rx: watch::Receiver<DisplayViewModel>,
    driver: JoinHandle<()>,
}

impl DisplaySynchronizer {
    pub fn new(
        store: Arc<dyn VisitStore>,
        config: &PipelineConfig,
        posting: broadcast::Receiver<PostingState>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (view_tx, view_rx) = watch::channel(DisplayViewModel::default());

        let driver = Driver {
            store,
            view_tx,
            poll_interval: config.poll_interval(),
            visit_limit: config.visit_limit,
            restricted_prefixes: config.restricted_prefixes.clone(),
            seq: Arc::new(AtomicU64::new(0)),
            url: None,
        };
        let handle = tokio::spawn(driver.run(cmd_rx, posting));

        Self {
            commands: cmd_tx,
            view_rx,
            driver: handle,
        }
    }

    /// Watch the view model. The receiver sees every published state.
    pub fn view(&self) -> watch::Receiver<DisplayViewModel> {
        self.view_rx.clone()
    }

    /// (Re)bind the panel to a URL, resetting the view model.
    pub async fn bind(&self, url: &str) {
        let _ = self.commands.send(SyncCommand::Bind(url.to_string())).await;
    }

    /// Manually re-run the fetch. Idempotent; safe while a fetch is in flight.
    pub async fn refetch(&self) {
        let _ = self.commands.send(SyncCommand::Refetch).await;
    }
}

impl Drop for DisplaySynchronizer {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

struct Driver {
    store: Arc<dyn VisitStore>,
    view_tx: watch::Sender<DisplayViewModel>,
    poll_interval: Duration,
    visit_limit: u32,
    restricted_prefixes: Vec<String>,
    seq: Arc<AtomicU64>,
    url: Option<String>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SyncCommand>,
        mut posting: broadcast::Receiver<PostingState>,
    ) {
        let mut poll = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut posting_open = true;

        loop {
            tokio::select! {
                maybe = commands.recv() => {
                    match maybe {
                        Some(SyncCommand::Bind(url)) => {
                            self.url = Some(url);
                            poll.reset();
                            self.start_fetch(true);
                        }
                        Some(SyncCommand::Refetch) => self.start_fetch(false),
                        None => break,
                    }
                }
                _ = poll.tick() => self.start_fetch(false),
                result = posting.recv(), if posting_open => {
                    match result {
                        Ok(state) if state.is_terminal() => {
                            log::debug!("posting finished ({state:?}); refetching");
                            self.start_fetch(false);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::debug!("posting broadcast lagged by {skipped}; refetching");
                            self.start_fetch(false);
                        }
                        Err(broadcast::error::RecvError::Closed) => posting_open = false,
                    }
                }
            }
        }
    }

    fn start_fetch(&self, reset: bool) {
        let Some(url) = self.url.clone() else { return };

        // Restricted pages get an immediate empty state, no network at all.
        if is_restricted(&url, &self.restricted_prefixes) {
            self.view_tx.send_replace(DisplayViewModel {
                url,
                no_data: true,
                ..Default::default()
            });
            return;
        }

        if reset {
            self.view_tx.send_replace(DisplayViewModel {
                url: url.clone(),
                loading: true,
                ..Default::default()
            });
        } else {
            self.view_tx.send_modify(|vm| {
                vm.loading = true;
                vm.error = None;
            });
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let store = self.store.clone();
        let view_tx = self.view_tx.clone();
        let seq_counter = self.seq.clone();
        let limit = self.visit_limit;

        tokio::spawn(async move {
            let (metrics, visits) =
                futures::join!(store.latest_metrics(&url), store.visit_history(&url, limit));

            // Latest wins: a newer fetch has started, or the panel moved on.
            if seq_counter.load(Ordering::SeqCst) != seq {
                return;
            }

            view_tx.send_modify(|vm| {
                if vm.url != url {
                    return;
                }
                vm.loading = false;
                match (metrics, visits) {
                    (Ok(metrics), Ok(visits)) => {
                        vm.no_data = metrics.is_none() && visits.is_empty();
                        vm.metrics = metrics;
                        vm.visits = visits;
                        vm.error = None;
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        log::warn!("fetch failed for {url}: {e}");
                        vm.error = Some(SyncError::from_error(&e));
                    }
                }
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::snapshot::MetricsSnapshot;
    use crate::storage::MemoryStore;
    use crate::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicBool;
    use tokio::time::timeout;

    fn snapshot(url: &str) -> MetricsSnapshot {
        MetricsSnapshot {
            url: url.to_string(),
            link_count: 3,
            word_count: 120,
            image_count: 2,
            captured_at: Utc::now(),
            tz_offset_hours: 0.0,
        }
    }

    async fn settled(view: &mut watch::Receiver<DisplayViewModel>) -> DisplayViewModel {
        timeout(Duration::from_secs(5), async {
            loop {
                view.changed().await.unwrap();
                let vm = view.borrow().clone();
                if !vm.loading {
                    return vm;
                }
            }
        })
        .await
        .expect("view never settled")
    }

    fn posting_pair() -> (broadcast::Sender<PostingState>, broadcast::Receiver<PostingState>) {
        let (tx, rx) = broadcast::channel(16);
        (tx, rx)
    }

    #[tokio::test]
    async fn empty_store_reads_as_no_data_not_error() {
        let (_tx, rx) = posting_pair();
        let sync = DisplaySynchronizer::new(
            Arc::new(MemoryStore::new()),
            &PipelineConfig::default(),
            rx,
        );
        let mut view = sync.view();

        sync.bind("https://a.test").await;
        let vm = settled(&mut view).await;
        assert!(vm.no_data);
        assert!(vm.metrics.is_none());
        assert!(vm.visits.is_empty());
        assert!(vm.error.is_none());
    }

    struct CountingStore {
        inner: MemoryStore,
        calls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl VisitStore for CountingStore {
        async fn record_visit(&self, s: &MetricsSnapshot) -> Result<VisitRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.record_visit(s).await
        }

        async fn latest_metrics(&self, url: &str) -> Result<Option<PageMetrics>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.latest_metrics(url).await
        }

        async fn visit_history(&self, url: &str, limit: u32) -> Result<Vec<VisitRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.visit_history(url, limit).await
        }
    }

    #[tokio::test]
    async fn restricted_url_skips_network_entirely() {
        let calls = Arc::new(AtomicU64::new(0));
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            calls: calls.clone(),
        });
        let (_tx, rx) = posting_pair();
        let sync = DisplaySynchronizer::new(store, &PipelineConfig::default(), rx);
        let mut view = sync.view();

        sync.bind("chrome://settings").await;
        view.changed().await.unwrap();
        let vm = view.borrow().clone();
        assert!(vm.no_data);
        assert!(!vm.loading);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn posting_broadcast_triggers_refetch_before_next_poll() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = posting_pair();
        // Default 30s poll: any update inside the test window proves push.
        let sync = DisplaySynchronizer::new(store.clone(), &PipelineConfig::default(), rx);
        let mut view = sync.view();

        sync.bind("https://a.test").await;
        let vm = settled(&mut view).await;
        assert!(vm.no_data);

        store.record_visit(&snapshot("https://a.test")).await.unwrap();
        tx.send(PostingState::PostedOk).unwrap();

        let vm = settled(&mut view).await;
        assert!(!vm.no_data);
        assert_eq!(vm.metrics.unwrap().visit_count, 1);
        assert_eq!(vm.visits.len(), 1);
    }

    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl VisitStore for FlakyStore {
        async fn record_visit(&self, s: &MetricsSnapshot) -> Result<VisitRecord> {
            self.inner.record_visit(s).await
        }

        async fn latest_metrics(&self, url: &str) -> Result<Option<PageMetrics>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::NetworkUnreachable("offline".to_string()));
            }
            self.inner.latest_metrics(url).await
        }

        async fn visit_history(&self, url: &str, limit: u32) -> Result<Vec<VisitRecord>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::NetworkUnreachable("offline".to_string()));
            }
            self.inner.visit_history(url, limit).await
        }
    }

    #[tokio::test]
    async fn manual_refetch_clears_error_once_network_recovers() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(true),
        });
        store
            .inner
            .record_visit(&snapshot("https://a.test"))
            .await
            .unwrap();

        let (_tx, rx) = posting_pair();
        let sync = DisplaySynchronizer::new(store.clone(), &PipelineConfig::default(), rx);
        let mut view = sync.view();

        sync.bind("https://a.test").await;
        let vm = settled(&mut view).await;
        assert!(matches!(vm.error, Some(SyncError::Unreachable(_))));
        assert!(vm.error.unwrap().is_retryable());

        store.failing.store(false, Ordering::SeqCst);
        sync.refetch().await;
        let vm = settled(&mut view).await;
        assert!(vm.error.is_none());
        assert_eq!(vm.visits.len(), 1);
    }

    struct SlowStore {
        inner: MemoryStore,
        slow_url: String,
        delay: Duration,
    }

    #[async_trait]
    impl VisitStore for SlowStore {
        async fn record_visit(&self, s: &MetricsSnapshot) -> Result<VisitRecord> {
            self.inner.record_visit(s).await
        }

        async fn latest_metrics(&self, url: &str) -> Result<Option<PageMetrics>> {
            if url == self.slow_url {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.latest_metrics(url).await
        }

        async fn visit_history(&self, url: &str, limit: u32) -> Result<Vec<VisitRecord>> {
            if url == self.slow_url {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.visit_history(url, limit).await
        }
    }

    #[tokio::test]
    async fn stale_inflight_fetch_never_overwrites_newer_binding() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            slow_url: "https://slow.test".to_string(),
            delay: Duration::from_millis(200),
        });
        store
            .inner
            .record_visit(&snapshot("https://slow.test"))
            .await
            .unwrap();
        store
            .inner
            .record_visit(&snapshot("https://fast.test"))
            .await
            .unwrap();

        let (_tx, rx) = posting_pair();
        let sync = DisplaySynchronizer::new(store, &PipelineConfig::default(), rx);
        let mut view = sync.view();

        sync.bind("https://slow.test").await;
        // Rebind while the slow fetch is still in flight.
        sync.bind("https://fast.test").await;

        let vm = settled(&mut view).await;
        assert_eq!(vm.url, "https://fast.test");
        assert_eq!(vm.visits.len(), 1);
        assert_eq!(vm.visits[0].url, "https://fast.test");

        // Let the slow response land, then confirm nothing changed.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let vm = view.borrow().clone();
        assert_eq!(vm.url, "https://fast.test");
        assert_eq!(vm.visits[0].url, "https://fast.test");
    }
}
