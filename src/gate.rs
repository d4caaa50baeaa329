use chrono::{DateTime, Utc};

/// Foreground-tab probe. The gate cross-checks the candidate URL against the
/// active tab's URL rather than trusting a visibility flag alone.
pub trait TabProbe: Send + Sync {
    fn active_tab_url(&self) -> Option<String>;
}

/// Per page-context emission bookkeeping. One instance per page-context
/// lifetime, owned by its gate; never shared across contexts.
#[derive(Debug, Default)]
pub struct NavigationState {
    last_emitted_url: Option<String>,
    last_emitted_at: Option<DateTime<Utc>>,
}

/// Decides whether a settled navigation becomes an emitted snapshot.
///
/// Rules run cheapest-first and short-circuit: repeat URL, global throttle,
/// restricted scheme, background tab.
pub struct EmissionGate {
    state: NavigationState,
    min_interval_ms: i64,
    restricted_prefixes: Vec<String>,
}

impl EmissionGate {
    pub fn new(min_interval_ms: u64, restricted_prefixes: Vec<String>) -> Self {
        Self {
            state: NavigationState::default(),
            min_interval_ms: min_interval_ms as i64,
            restricted_prefixes,
        }
    }

    pub fn should_emit(&self, url: &str, now: DateTime<Utc>, tabs: &dyn TabProbe) -> bool {
        if Some(url) == self.state.last_emitted_url.as_deref() {
            log::debug!("suppressed (already recorded): {}", url);
            return false;
        }

        if let Some(last) = self.state.last_emitted_at {
            if (now - last).num_milliseconds() < self.min_interval_ms {
                log::debug!("suppressed (rate limited): {}", url);
                return false;
            }
        }

        if is_restricted(url, &self.restricted_prefixes) {
            log::debug!("suppressed (restricted scheme): {}", url);
            return false;
        }

        if tabs.active_tab_url().as_deref() != Some(url) {
            log::debug!("suppressed (tab not foreground): {}", url);
            return false;
        }

        true
    }

    /// Record an emission. Called before awaiting the relay so rapid triggers
    /// racing an in-flight send cannot double-emit the same URL.
    pub fn record_emission(&mut self, url: &str, now: DateTime<Utc>) {
        self.state.last_emitted_url = Some(url.to_string());
        self.state.last_emitted_at = Some(now);
    }
}

/// Internal-browser pages, extension pages, `about:` and local files are
/// never recorded and never queried.
pub fn is_restricted(url: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| url.starts_with(p.as_str()))
}
