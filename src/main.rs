use clap::{Parser, Subcommand};
use pagetrail::collector::{Collector, PageDocument};
use pagetrail::config::{ConfigLoader, PipelineConfig};
use pagetrail::display::DisplaySynchronizer;
use pagetrail::gate::TabProbe;
use pagetrail::metrics::extractor;
use pagetrail::monitor::{NavTrigger, NavTriggerKind, NavigationMonitor, NavigationSource};
use pagetrail::relay::{self, IngestionRelay, PostingState};
use pagetrail::storage::HttpStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "pagetrail")]
#[command(version = "0.1.0")]
#[command(about = "Navigation-aware page metrics pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a page, run the collection pipeline once, and record the visit
    Record {
        /// Page URL to collect metrics for
        #[arg(short, long)]
        url: String,

        /// Path to the configuration file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print stored metrics and visit history for a URL
    Show {
        /// Page URL to look up
        #[arg(short, long)]
        url: String,

        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// A page fetched once over HTTP; the CLI's stand-in for a live document.
struct FetchedPage {
    html: String,
}

impl PageDocument for FetchedPage {
    fn html(&self) -> String {
        self.html.clone()
    }
}

/// The CLI drives exactly one page, so that page is always foreground.
struct ForegroundTab {
    url: String,
}

impl TabProbe for ForegroundTab {
    fn active_tab_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

/// One-shot navigation source: document-ready followed by full-load, the
/// initial-evaluation path a freshly observed page produces.
struct InitialLoad {
    url: String,
}

impl NavigationSource for InitialLoad {
    fn subscribe(&mut self) -> mpsc::Receiver<NavTrigger> {
        let (tx, rx) = mpsc::channel(4);
        let url = self.url.clone();
        tokio::spawn(async move {
            let _ = tx
                .send(NavTrigger::new(NavTriggerKind::DocumentReady, url.clone()))
                .await;
            let _ = tx.send(NavTrigger::new(NavTriggerKind::FullLoad, url)).await;
        });
        rx
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<PipelineConfig> {
    Ok(match path {
        Some(path) => {
            log::info!("Loading config from {:?}", path);
            ConfigLoader::load(&path)?
        }
        None => PipelineConfig::default(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Record { url, config } => {
            let config = load_config(config)?;
            let tz_offset = extractor::local_tz_offset_hours();
            let store = Arc::new(HttpStore::new(&config, tz_offset)?);

            let (channel, requests) = relay::channel(16);
            let ingest = IngestionRelay::new(store);
            let mut posting = ingest.subscribe();
            ingest.spawn(requests);

            log::info!("Fetching {}", url);
            let html = reqwest::get(&url).await?.text().await?;

            let mut source = InitialLoad { url: url.clone() };
            let settled = NavigationMonitor::spawn(config.settle_delay(), source.subscribe());
            let collector = Collector::new(
                &config,
                channel,
                Arc::new(FetchedPage { html }),
                Arc::new(ForegroundTab { url: url.clone() }),
                tz_offset,
            );
            let pipeline = collector.spawn(settled);

            let mut recorded = false;
            while let Ok(state) = posting.recv().await {
                match state {
                    PostingState::PostedOk => {
                        recorded = true;
                        break;
                    }
                    PostingState::PostedError(message) => {
                        eprintln!("❌ Failed to record visit: {message}");
                        std::process::exit(1);
                    }
                    _ => {}
                }
            }
            pipeline.await?;

            if recorded {
                println!("✅ Visit recorded for {url}");
            } else {
                println!("No visit recorded (emission suppressed)");
            }
        }
        Commands::Show { url, config } => {
            let config = load_config(config)?;
            let tz_offset = extractor::local_tz_offset_hours();
            let store = Arc::new(HttpStore::new(&config, tz_offset)?);

            let (_posting_tx, posting_rx) = tokio::sync::broadcast::channel(1);
            let sync = DisplaySynchronizer::new(store, &config, posting_rx);
            let mut view = sync.view();
            sync.bind(&url).await;

            let vm = loop {
                view.changed().await?;
                let vm = view.borrow().clone();
                if !vm.loading {
                    break vm;
                }
            };

            if let Some(error) = vm.error {
                eprintln!("❌ Fetch failed: {error:?}");
                std::process::exit(1);
            }
            if vm.no_data {
                println!("No visits recorded yet for {url}");
            } else {
                if let Some(metrics) = vm.metrics {
                    println!("Metrics for {}:", metrics.url);
                    println!("   Links:  {}", metrics.link_count);
                    println!("   Words:  {}", metrics.word_count);
                    println!("   Images: {}", metrics.image_count);
                    println!("   Visits: {}", metrics.visit_count);
                    if let Some(last) = metrics.last_visited {
                        println!("   Last visited: {}", last.to_rfc3339());
                    }
                }
                for visit in vm.visits {
                    println!(
                        "   {} links={} words={} images={}",
                        visit.datetime_visited.to_rfc3339(),
                        visit.link_count,
                        visit.word_count,
                        visit.image_count
                    );
                }
            }
        }
        Commands::Check { config } => match ConfigLoader::load(&config) {
            Ok(cfg) => {
                println!("✅ Config is valid:");
                println!("   API base URL: {}", cfg.api_base_url);
                println!("   Settle delay: {}ms", cfg.settle_delay_ms);
                println!("   Min emit interval: {}ms", cfg.min_emit_interval_ms);
                println!("   Poll interval: {}s", cfg.poll_interval_secs);
                println!("   Restricted prefixes: {:?}", cfg.restricted_prefixes);
            }
            Err(e) => {
                eprintln!("❌ Config error: {e}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
