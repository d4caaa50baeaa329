pub mod collector;
pub mod config;
pub mod display;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod monitor;
pub mod relay;
pub mod storage;

pub use collector::{Collector, PageDocument};
pub use display::{DisplaySynchronizer, DisplayViewModel};
pub use error::{Error, Result};
pub use gate::{EmissionGate, TabProbe};
pub use metrics::extractor::extract;
pub use metrics::snapshot::MetricsSnapshot;
pub use monitor::{NavTrigger, NavTriggerKind, NavigationMonitor, SettledNavigation};
pub use relay::{PostingState, RelayChannel};
pub use storage::{normalize_url, HttpStore, MemoryStore, VisitStore};
