use crate::config::schema::{PipelineConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::metrics::snapshot::MetricsSnapshot;
use crate::storage::{normalize_url, PageMetrics, VisitRecord, VisitStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::sleep;
use url::Url;

/// HTTP client for the metrics storage service.
///
/// Reads absorb 404 into "nothing recorded yet"; all operations retry
/// transient failures with capped exponential backoff. No request timeout is
/// set: the retry policy bounds total exposure.
pub struct HttpStore {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    tz_offset_hours: f64,
}

impl HttpStore {
    pub fn new(config: &PipelineConfig, tz_offset_hours: f64) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| Error::Config(format!("api_base_url: {e}")))?;
        let client = Client::builder()
            .user_agent("pagetrail/0.1")
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            retry: config.retry.clone(),
            tz_offset_hours,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("{path}: {e}")))
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    log::warn!(
                        "storage call failed (attempt {attempt}/{}): {e}; retrying in {delay:?}",
                        self.retry.max_retries
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_metrics(&self, url: &str) -> Result<Option<PageMetrics>> {
        let response = self
            .client
            .get(self.endpoint("/metrics")?)
            .query(&[
                ("url", url.to_string()),
                ("tz_offset", self.tz_offset_hours.to_string()),
            ])
            .send()
            .await
            .map_err(classify)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await.map(Some)
    }

    async fn fetch_visits(&self, url: &str, limit: u32) -> Result<Vec<VisitRecord>> {
        let response = self
            .client
            .get(self.endpoint("/visits")?)
            .query(&[
                ("url", url.to_string()),
                ("limit", limit.to_string()),
                ("tz_offset", self.tz_offset_hours.to_string()),
            ])
            .send()
            .await
            .map_err(classify)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        read_json(response).await
    }

    async fn post_visit(&self, snapshot: &MetricsSnapshot) -> Result<VisitRecord> {
        let body = json!({
            "url": normalize_url(&snapshot.url),
            "link_count": snapshot.link_count,
            "word_count": snapshot.word_count,
            "image_count": snapshot.image_count,
            "datetime_visited": snapshot.captured_at.to_rfc3339(),
        });

        let response = self
            .client
            .post(self.endpoint("/visits")?)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        read_json(response).await
    }
}

#[async_trait]
impl VisitStore for HttpStore {
    async fn record_visit(&self, snapshot: &MetricsSnapshot) -> Result<VisitRecord> {
        self.with_retry(|| self.post_visit(snapshot)).await
    }

    async fn latest_metrics(&self, url: &str) -> Result<Option<PageMetrics>> {
        let url = normalize_url(url);
        self.with_retry(|| self.fetch_metrics(&url)).await
    }

    async fn visit_history(&self, url: &str, limit: u32) -> Result<Vec<VisitRecord>> {
        let url = normalize_url(url);
        self.with_retry(|| self.fetch_visits(&url, limit)).await
    }
}

/// Transport failures (no HTTP status received) are network-unreachable.
fn classify(e: reqwest::Error) -> Error {
    Error::NetworkUnreachable(e.to_string())
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(classify)?;

    if !status.is_success() {
        return Err(Error::RemoteRejected {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        });
    }
    Ok(serde_json::from_str(&body)?)
}
