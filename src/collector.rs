use crate::config::schema::PipelineConfig;
use crate::error::Error;
use crate::gate::{EmissionGate, TabProbe};
use crate::metrics::extractor;
use crate::monitor::SettledNavigation;
use crate::relay::RelayChannel;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// Access to the observed page's current document.
pub trait PageDocument: Send + Sync {
    fn html(&self) -> String;
}

/// Page-context agent: turns settled navigations into relayed snapshots.
///
/// Consults the emission gate, records the emission before awaiting the relay
/// (so in-flight latency cannot double-emit), and on channel teardown halts
/// emission until a liveness probe confirms the privileged side is back.
pub struct Collector {
    gate: EmissionGate,
    channel: RelayChannel,
    page: Arc<dyn PageDocument>,
    tabs: Arc<dyn TabProbe>,
    tz_offset_hours: f64,
    liveness_interval: Duration,
}

impl Collector {
    pub fn new(
        config: &PipelineConfig,
        channel: RelayChannel,
        page: Arc<dyn PageDocument>,
        tabs: Arc<dyn TabProbe>,
        tz_offset_hours: f64,
    ) -> Self {
        Self {
            gate: EmissionGate::new(
                config.min_emit_interval_ms,
                config.restricted_prefixes.clone(),
            ),
            channel,
            page,
            tabs,
            tz_offset_hours,
            liveness_interval: config.liveness_interval(),
        }
    }

    pub fn spawn(self, settled: mpsc::Receiver<SettledNavigation>) -> JoinHandle<()> {
        tokio::spawn(self.run(settled))
    }

    pub async fn run(mut self, mut settled: mpsc::Receiver<SettledNavigation>) {
        'main: loop {
            let nav = match settled.recv().await {
                Some(nav) => nav,
                None => break,
            };

            let now = Utc::now();
            if !self.gate.should_emit(&nav.url, now, self.tabs.as_ref()) {
                continue;
            }
            self.gate.record_emission(&nav.url, now);

            let snapshot = extractor::extract(&nav.url, &self.page.html(), self.tz_offset_hours);
            match self.channel.send(snapshot).await {
                Ok(record) => {
                    log::info!("visit {} recorded for {}", record.id, record.url);
                }
                Err(Error::ChannelClosed) => {
                    log::warn!("relay channel down; halting emission until it answers");
                    if !self.await_restoration(&mut settled).await {
                        break 'main;
                    }
                }
                Err(e) => {
                    log::error!("relay rejected snapshot for {}: {}", nav.url, e);
                }
            }
        }
        log::debug!("collector shutting down");
    }

    /// Halted mode: discard settled events and probe liveness on an interval.
    /// The probe stops itself the moment the channel answers. Returns false
    /// when the navigation stream closed while halted.
    async fn await_restoration(&self, settled: &mut mpsc::Receiver<SettledNavigation>) -> bool {
        let mut probe = interval_at(
            Instant::now() + self.liveness_interval,
            self.liveness_interval,
        );

        loop {
            tokio::select! {
                maybe = settled.recv() => {
                    match maybe {
                        Some(nav) => log::debug!("discarding {} while channel is down", nav.url),
                        None => return false,
                    }
                }
                _ = probe.tick() => {
                    if self.channel.probe().await {
                        log::info!("relay channel restored; resuming emission");
                        return true;
                    }
                }
            }
        }
    }
}
