pub mod extractor;
pub mod snapshot;

pub use extractor::{extract, local_tz_offset_hours};
pub use snapshot::MetricsSnapshot;
