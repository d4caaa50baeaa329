use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Base URL of the metrics storage service.
    #[serde(default = "default_api_base_url")]
    #[validate(url)]
    pub api_base_url: String,

    /// Debounce window after a navigation trigger before extraction runs,
    /// letting client-rendered content populate first.
    #[serde(default = "default_settle_delay_ms")]
    #[validate(range(min = 1))]
    pub settle_delay_ms: u64,

    /// Global minimum interval between emitted snapshots, independent of URL.
    #[serde(default = "default_min_emit_interval_ms")]
    #[validate(range(min = 1))]
    pub min_emit_interval_ms: u64,

    /// Display refresh interval.
    #[serde(default = "default_poll_interval_secs")]
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Probe interval while the relay channel is down.
    #[serde(default = "default_liveness_interval_secs")]
    #[validate(range(min = 1))]
    pub liveness_interval_secs: u64,

    /// Maximum visit-history entries fetched per URL.
    #[serde(default = "default_visit_limit")]
    #[validate(range(min = 1))]
    pub visit_limit: u32,

    /// URL prefixes that are never recorded and never queried.
    #[serde(default = "default_restricted_prefixes")]
    pub restricted_prefixes: Vec<String>,

    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Backoff before the given retry attempt (0-based): min(base * 2^attempt, max).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            settle_delay_ms: default_settle_delay_ms(),
            min_emit_interval_ms: default_min_emit_interval_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            liveness_interval_secs: default_liveness_interval_secs(),
            visit_limit: default_visit_limit(),
            restricted_prefixes: default_restricted_prefixes(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_min_emit_interval_ms() -> u64 {
    5_000
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_liveness_interval_secs() -> u64 {
    5
}

fn default_visit_limit() -> u32 {
    50
}

fn default_restricted_prefixes() -> Vec<String> {
    ["chrome://", "chrome-extension://", "about:", "file://"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}
