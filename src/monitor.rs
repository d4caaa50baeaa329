use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// What woke the monitor up.
///
/// Document-lifecycle kinds force a re-evaluation even when the URL has not
/// changed (subresource counts may have grown by full load); route-change
/// kinds are dropped early when the URL matches the last settled one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTriggerKind {
    DocumentReady,
    FullLoad,
    DomMutation,
    HistoryPush,
    HistoryReplace,
    PopState,
}

impl NavTriggerKind {
    fn is_forced(self) -> bool {
        matches!(self, NavTriggerKind::DocumentReady | NavTriggerKind::FullLoad)
    }
}

#[derive(Debug, Clone)]
pub struct NavTrigger {
    pub kind: NavTriggerKind,
    pub url: String,
}

impl NavTrigger {
    pub fn new(kind: NavTriggerKind, url: impl Into<String>) -> Self {
        Self { kind, url: url.into() }
    }
}

/// A navigation that survived the settle-delay debounce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledNavigation {
    pub url: String,
}

/// Seam for navigation intent detection. Concrete strategies (history-API
/// wrapping, DOM mutation observation, location polling) live behind this.
pub trait NavigationSource: Send {
    fn subscribe(&mut self) -> mpsc::Receiver<NavTrigger>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    Loading,
    Settled,
}

struct Pending {
    url: String,
    deadline: Instant,
}

/// Debounces navigation triggers into at most one settled event per window.
///
/// SPA frameworks mutate the DOM in bursts; each accepted trigger replaces
/// the pending settle deadline, so only the last trigger in a window fires.
pub struct NavigationMonitor {
    settle_delay: Duration,
    phase: MonitorPhase,
    last_settled_url: Option<String>,
}

impl NavigationMonitor {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            phase: MonitorPhase::Idle,
            last_settled_url: None,
        }
    }

    /// Spawn the monitor loop, returning the settled-navigation stream.
    pub fn spawn(
        settle_delay: Duration,
        triggers: mpsc::Receiver<NavTrigger>,
    ) -> mpsc::Receiver<SettledNavigation> {
        let (settled_tx, settled_rx) = mpsc::channel(16);
        let monitor = Self::new(settle_delay);
        tokio::spawn(monitor.run(triggers, settled_tx));
        settled_rx
    }

    pub async fn run(
        mut self,
        mut triggers: mpsc::Receiver<NavTrigger>,
        settled_tx: mpsc::Sender<SettledNavigation>,
    ) {
        let mut pending: Option<Pending> = None;

        loop {
            let deadline = pending.as_ref().map(|p| p.deadline);

            tokio::select! {
                maybe = triggers.recv() => {
                    match maybe {
                        Some(trigger) => self.observe(trigger, &mut pending),
                        None => {
                            // Source went away; let an armed settle fire first.
                            if let Some(p) = pending.take() {
                                sleep_until(p.deadline).await;
                                self.settle(p.url, &settled_tx).await;
                            }
                            break;
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(p) = pending.take() {
                        if !self.settle(p.url, &settled_tx).await {
                            break;
                        }
                    }
                }
            }
        }
    }

    fn observe(&mut self, trigger: NavTrigger, pending: &mut Option<Pending>) {
        if self.phase == MonitorPhase::Idle {
            self.phase = MonitorPhase::Loading;
        }

        // Cheap short-circuit before any heavier work.
        if !trigger.kind.is_forced() && Some(&trigger.url) == self.last_settled_url.as_ref() {
            return;
        }

        log::debug!("navigation trigger {:?} for {}", trigger.kind, trigger.url);
        *pending = Some(Pending {
            url: trigger.url,
            deadline: Instant::now() + self.settle_delay,
        });
    }

    async fn settle(&mut self, url: String, settled_tx: &mpsc::Sender<SettledNavigation>) -> bool {
        self.phase = MonitorPhase::Settled;
        self.last_settled_url = Some(url.clone());
        log::debug!("navigation settled: {}", url);
        settled_tx.send(SettledNavigation { url }).await.is_ok()
    }
}
