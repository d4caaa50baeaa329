use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time measurement of page metrics tied to a URL.
///
/// Built fresh per extraction and never mutated afterwards; ownership moves
/// to the relay channel on emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub url: String,
    pub link_count: u64,
    pub word_count: u64,
    pub image_count: u64,
    pub captured_at: DateTime<Utc>,
    pub tz_offset_hours: f64,
}
