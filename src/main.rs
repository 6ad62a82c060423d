//! # News Archiver
//!
//! Archives articles from news sites that publish syndication feeds. Feeds
//! are polled for new articles, the linked pages are downloaded and reduced
//! to their article text, and stored bodies are migrated to a single compact
//! encoding.
//!
//! ## Usage
//!
//! ```sh
//! news_archiver --config config.yaml poll --watch
//! news_archiver --config config.yaml download --limit 500
//! news_archiver --config config.yaml compact
//! ```
//!
//! ## Architecture
//!
//! Each subcommand runs one stage of the pipeline for every configured site
//! (or the one given with `--site`):
//! 1. **poll**: fetch the feeds, store articles not seen before
//! 2. **download**: fill in bodies of articles that have none
//! 3. **compact**: re-encode legacy bodies canonically, one site at a time

use clap::Parser;
use futures::future::join_all;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::{Cli, Command};
use news_archiver::config::{Config, SiteConfig};
use news_archiver::feed::HttpFeedSource;
use news_archiver::fetch::{Fetcher, HttpFetcher};
use news_archiver::store::{DocumentStore, FileStore};
use news_archiver::{Compactor, Downloader, Ingestor, Poller, PollerOptions};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_archiver starting up");

    let args = Cli::parse();
    let config = Config::load(&args.config)?;

    let store: Arc<dyn DocumentStore> = match FileStore::open(&config.store.path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                path = %config.store.path.display(),
                error = %e,
                "Store directory is not usable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.poller.fetch_settings())?);

    match args.command {
        Command::Poll { site, watch, every } => {
            let sites = config.select_sites(site.as_deref())?;
            let interval = every
                .map(Duration::from_secs)
                .or_else(|| watch.then(|| config.poller.interval()));
            poll(&config, sites, store, fetcher, interval).await;
        }
        Command::Download { site, limit } => {
            for site in config.select_sites(site.as_deref())? {
                let downloader = Downloader::new(Arc::clone(&store), Arc::clone(&fetcher), &site.collection, site.profile());
                if let Err(e) = downloader.run(limit).await {
                    error!(site = %site.name, error = %e, "Download run failed");
                }
            }
        }
        Command::Compact { site, page_size } => {
            // Sites are compacted one after another, never concurrently.
            for site in config.select_sites(site.as_deref())? {
                let mut compactor = Compactor::new(Arc::clone(&store), &site.collection, site.profile())
                    .with_page_size(page_size.unwrap_or(config.compactor.page_size));
                if let Some(pattern) = site.legacy_link_regex()? {
                    compactor = compactor.with_legacy_link_pattern(pattern);
                }
                if let Err(e) = compactor.run().await {
                    error!(site = %site.name, error = %e, "Compaction failed");
                }
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Poll every site once, or on an interval until Ctrl-C.
///
/// Each site gets its own poller and ingestor joined by a bounded channel.
/// Pollers are dropped before the ingestors are awaited so their channels
/// close and the ingestors flush their last batch.
async fn poll(
    config: &Config,
    sites: Vec<&SiteConfig>,
    store: Arc<dyn DocumentStore>,
    fetcher: Arc<dyn Fetcher>,
    interval: Option<Duration>,
) {
    let source = Arc::new(HttpFeedSource::new(fetcher));
    let mut pollers = Vec::with_capacity(sites.len());
    let mut ingestors = Vec::with_capacity(sites.len());

    for site in sites {
        let (tx, rx) = mpsc::channel(config.poller.channel_capacity);
        let options = PollerOptions::new(site.feeds.clone())
            .with_link_strategy(site.link)
            .with_fetch_timeout(config.poller.fetch_timeout());
        let poller = Poller::new(options, source.clone(), tx);
        info!(site = %site.name, feeds = poller.feeds().len(), collection = %site.collection, "Prepared poller");
        pollers.push((site.name.clone(), poller));

        let ingestor = Ingestor::new(Arc::clone(&store), &site.collection);
        ingestors.push(tokio::spawn(async move { ingestor.run(rx).await }));
    }

    match interval {
        None => {
            let reports = join_all(pollers.iter().map(|(_, poller)| poller.run_once())).await;
            for ((name, _), report) in pollers.iter().zip(reports) {
                info!(site = %name, delivered = report.delivered, feeds_failed = report.feeds_failed, "Site polled");
            }
        }
        Some(interval) => {
            for (_, poller) in &pollers {
                poller.run_every(interval).await;
            }
            info!(interval_secs = interval.as_secs(), "Polling; press Ctrl-C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C; stopping now");
            }
            info!("Stopping pollers");
            join_all(pollers.iter().map(|(_, poller)| poller.stop())).await;
        }
    }

    drop(pollers);
    for ingestor in ingestors {
        if let Err(e) = ingestor.await {
            error!(error = %e, "Ingest task failed");
        }
    }
}
