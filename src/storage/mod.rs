pub mod client;
pub mod memory;

pub use client::HttpStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::metrics::snapshot::MetricsSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded visit, as stored by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: i64,
    pub url: String,
    pub link_count: u64,
    pub word_count: u64,
    pub image_count: u64,
    pub datetime_visited: DateTime<Utc>,
}

/// Aggregated metrics for a URL: the latest visit's counts plus totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub url: String,
    pub link_count: u64,
    pub word_count: u64,
    pub image_count: u64,
    pub last_visited: Option<DateTime<Utc>>,
    pub visit_count: u64,
}

/// Visit storage backend. Visits are append-only; reads treat "nothing
/// recorded yet" as `None`/empty, never as an error.
#[async_trait]
pub trait VisitStore: Send + Sync {
    async fn record_visit(&self, snapshot: &MetricsSnapshot) -> Result<VisitRecord>;
    async fn latest_metrics(&self, url: &str) -> Result<Option<PageMetrics>>;
    async fn visit_history(&self, url: &str, limit: u32) -> Result<Vec<VisitRecord>>;
}

/// Normalize a URL the way the storage service does: strip exactly one
/// trailing slash; an empty result becomes `/`.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_exactly_one_trailing_slash() {
        assert_eq!(normalize_url("https://x.com/"), "https://x.com");
        assert_eq!(normalize_url("https://x.com"), "https://x.com");
        assert_eq!(normalize_url("https://x.com/a/b/"), "https://x.com/a/b");
        assert_eq!(normalize_url("https://x.com//"), "https://x.com/");
    }

    #[test]
    fn empty_path_becomes_root() {
        assert_eq!(normalize_url("/"), "/");
        assert_eq!(normalize_url(""), "/");
    }
}
