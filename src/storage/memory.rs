use crate::error::Result;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::storage::{normalize_url, PageMetrics, VisitRecord, VisitStore};
use async_trait::async_trait;
use std::sync::Mutex;

/// In-process visit store: an append-only log with the same aggregation
/// semantics as the remote service. Backs tests and offline runs.
#[derive(Default)]
pub struct MemoryStore {
    visits: Mutex<Vec<VisitRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VisitStore for MemoryStore {
    async fn record_visit(&self, snapshot: &MetricsSnapshot) -> Result<VisitRecord> {
        let mut visits = self.visits.lock().unwrap();
        let record = VisitRecord {
            id: visits.len() as i64 + 1,
            url: normalize_url(&snapshot.url),
            link_count: snapshot.link_count,
            word_count: snapshot.word_count,
            image_count: snapshot.image_count,
            datetime_visited: snapshot.captured_at,
        };
        visits.push(record.clone());
        Ok(record)
    }

    async fn latest_metrics(&self, url: &str) -> Result<Option<PageMetrics>> {
        let url = normalize_url(url);
        let visits = self.visits.lock().unwrap();
        let matching: Vec<&VisitRecord> = visits.iter().filter(|v| v.url == url).collect();

        Ok(matching.last().map(|latest| PageMetrics {
            url: url.clone(),
            link_count: latest.link_count,
            word_count: latest.word_count,
            image_count: latest.image_count,
            last_visited: Some(latest.datetime_visited),
            visit_count: matching.len() as u64,
        }))
    }

    async fn visit_history(&self, url: &str, limit: u32) -> Result<Vec<VisitRecord>> {
        let url = normalize_url(url);
        let visits = self.visits.lock().unwrap();
        Ok(visits
            .iter()
            .rev()
            .filter(|v| v.url == url)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(url: &str, links: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            url: url.to_string(),
            link_count: links,
            word_count: 100,
            image_count: 2,
            captured_at: Utc::now(),
            tz_offset_hours: 0.0,
        }
    }

    #[tokio::test]
    async fn aggregates_latest_counts_and_visit_count() {
        let store = MemoryStore::new();
        store.record_visit(&snapshot("https://a.test", 3)).await.unwrap();
        store.record_visit(&snapshot("https://a.test/", 7)).await.unwrap();
        store.record_visit(&snapshot("https://b.test", 1)).await.unwrap();

        let metrics = store.latest_metrics("https://a.test").await.unwrap().unwrap();
        assert_eq!(metrics.visit_count, 2);
        assert_eq!(metrics.link_count, 7);
    }

    #[tokio::test]
    async fn unknown_url_reads_as_none_and_empty() {
        let store = MemoryStore::new();
        assert!(store.latest_metrics("https://a.test").await.unwrap().is_none());
        assert!(store.visit_history("https://a.test", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_most_recent_first_and_limited() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.record_visit(&snapshot("https://a.test", i)).await.unwrap();
        }
        let history = store.visit_history("https://a.test", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].link_count, 4);
        assert_eq!(history[2].link_count, 2);
    }
}
