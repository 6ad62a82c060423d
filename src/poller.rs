//! Concurrent feed polling.
//!
//! A [`Poller`] owns a fixed list of feed URLs and turns their items into
//! [`Article`]s delivered on a bounded channel. The channel provides
//! backpressure: a slow consumer suspends the fetch workers instead of
//! letting articles pile up in memory.
//!
//! # Modes
//!
//! - [`Poller::run_once`]: one cycle. Every feed is fetched by its own task
//!   and the call returns once all of them have finished or failed.
//! - [`Poller::run_every`]: a background loop that runs a cycle right away
//!   and then once per interval. Starting a new loop stops the previous one
//!   first, so at most one loop is ever active.
//! - [`Poller::stop`]: asks the loop to exit at its next wake point and waits
//!   until it has. A cycle that is already running is allowed to finish.
//!
//! A feed that cannot be fetched or parsed is logged and counted in the
//! cycle's [`PollReport`]; it never affects the other feeds. The poller never
//! closes the output channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FeedError, FetchError};
use crate::feed::{FeedSource, LinkStrategy, parse_pub_date};
use crate::models::{Article, FeedItem};

/// Picks the canonical link of an article from its feed item.
pub type LinkChooser = Arc<dyn Fn(&FeedItem) -> String + Send + Sync>;

#[derive(Clone)]
pub struct PollerOptions {
    pub feeds: Vec<String>,
    pub link: LinkChooser,
    /// Upper bound for reading one feed, download and parsing included.
    pub fetch_timeout: Duration,
}

impl PollerOptions {
    pub fn new(feeds: Vec<String>) -> Self {
        Self {
            feeds,
            link: Arc::new(|item: &FeedItem| LinkStrategy::Item.choose(item)),
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_link_strategy(mut self, strategy: LinkStrategy) -> Self {
        self.link = Arc::new(move |item: &FeedItem| strategy.choose(item));
        self
    }

    pub fn with_link_chooser(mut self, link: LinkChooser) -> Self {
        self.link = link;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    /// Articles sent on the output channel.
    pub delivered: usize,
    /// Items skipped because another feed of the same cycle already delivered their id.
    pub duplicates: usize,
    /// Items skipped because the link chooser gave them no link.
    pub without_link: usize,
}

pub struct Poller {
    cycle: Arc<Cycle>,
    background: Mutex<Option<Background>>,
}

struct Cycle {
    options: PollerOptions,
    source: Arc<dyn FeedSource>,
    output: mpsc::Sender<Article>,
}

struct Background {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct FeedOutcome {
    delivered: usize,
    duplicates: usize,
    without_link: usize,
}

impl Poller {
    pub fn new(options: PollerOptions, source: Arc<dyn FeedSource>, output: mpsc::Sender<Article>) -> Self {
        Self {
            cycle: Arc::new(Cycle {
                options,
                source,
                output,
            }),
            background: Mutex::new(None),
        }
    }

    pub fn feeds(&self) -> &[String] {
        &self.cycle.options.feeds
    }

    /// Run one cycle over every feed and wait for all of them.
    pub async fn run_once(&self) -> PollReport {
        Arc::clone(&self.cycle).run().await
    }

    /// Start the background loop, replacing (and first stopping) any running one.
    pub async fn run_every(&self, interval: Duration) {
        let mut background = self.background.lock().await;
        if let Some(previous) = background.take() {
            info!("Restarting poll loop");
            previous.shutdown().await;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let cycle = Arc::clone(&self.cycle);
        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), feeds = cycle.options.feeds.len(), "Poll loop started");
            loop {
                Arc::clone(&cycle).run().await;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Poll loop stopped");
        });

        *background = Some(Background { cancel, handle });
    }

    /// Stop the background loop and wait until it has exited.
    ///
    /// Returns immediately when no loop is running.
    pub async fn stop(&self) {
        if let Some(background) = self.background.lock().await.take() {
            background.shutdown().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.background
            .lock()
            .await
            .as_ref()
            .is_some_and(|b| !b.handle.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(background) = self.background.get_mut().take() {
            background.cancel.cancel();
        }
    }
}

impl Background {
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Poll loop terminated abnormally");
        }
    }
}

impl Cycle {
    #[instrument(level = "info", skip_all, fields(feeds = self.options.feeds.len()))]
    async fn run(self: Arc<Self>) -> PollReport {
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut workers = JoinSet::new();
        for url in &self.options.feeds {
            let cycle = Arc::clone(&self);
            let seen = Arc::clone(&seen);
            let url = url.clone();
            workers.spawn(async move { cycle.poll_feed(&url, &seen).await });
        }

        let mut report = PollReport::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    report.feeds_ok += 1;
                    report.delivered += outcome.delivered;
                    report.duplicates += outcome.duplicates;
                    report.without_link += outcome.without_link;
                }
                Ok(Err(_)) => report.feeds_failed += 1,
                Err(e) => {
                    report.feeds_failed += 1;
                    error!(error = %e, "Feed worker panicked");
                }
            }
        }

        info!(
            feeds_ok = report.feeds_ok,
            feeds_failed = report.feeds_failed,
            delivered = report.delivered,
            duplicates = report.duplicates,
            without_link = report.without_link,
            "Poll cycle finished"
        );
        report
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn poll_feed(&self, url: &str, seen: &Mutex<HashSet<String>>) -> Result<FeedOutcome, FeedError> {
        let timeout = self.options.fetch_timeout;
        let items = match tokio::time::timeout(timeout, self.source.read_feed(url)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                warn!(error = %e, "Feed read failed");
                return Err(e);
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "Feed read timed out");
                return Err(FetchError::Timeout(timeout).into());
            }
        };

        let mut outcome = FeedOutcome::default();
        for item in items {
            let link = (self.options.link)(&item);
            if link.is_empty() {
                debug!(title = %item.title, "Skipping item without link");
                outcome.without_link += 1;
                continue;
            }

            let article = Article::new(link, item.title, item.description, parse_pub_date(&item.date));
            if !seen.lock().await.insert(article.id.clone()) {
                outcome.duplicates += 1;
                continue;
            }

            if self.output.send(article).await.is_err() {
                warn!(delivered = outcome.delivered, "Output channel closed; dropping remaining items");
                break;
            }
            outcome.delivered += 1;
        }

        if outcome.without_link > 0 {
            warn!(count = outcome.without_link, "Feed items without link were skipped");
        }
        debug!(delivered = outcome.delivered, duplicates = outcome.duplicates, "Feed polled");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned feeds; URLs without a feed fail like an unreachable host.
    #[derive(Default)]
    struct StubSource {
        feeds: HashMap<String, Vec<FeedItem>>,
        delay: Duration,
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl StubSource {
        fn with_feed(mut self, url: &str, links: &[&str]) -> Self {
            let items = links
                .iter()
                .map(|link| FeedItem {
                    title: format!("title of {link}"),
                    link: link.to_string(),
                    date: "Tue, 10 Jun 2014 09:41:00 +0200".to_string(),
                    ..FeedItem::default()
                })
                .collect();
            self.feeds.insert(url.to_string(), items);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait::async_trait]
    impl FeedSource for StubSource {
        async fn read_feed(&self, url: &str) -> Result<Vec<FeedItem>, FeedError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            self.feeds
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Network("connection refused".to_string()).into())
        }
    }

    fn poller(source: Arc<StubSource>, feeds: &[&str], capacity: usize) -> (Poller, mpsc::Receiver<Article>) {
        let (tx, rx) = mpsc::channel(capacity);
        let options = PollerOptions::new(feeds.iter().map(|s| s.to_string()).collect());
        (Poller::new(options, source, tx), rx)
    }

    #[tokio::test]
    async fn test_run_once_isolates_failing_feed() {
        let source = Arc::new(StubSource::default().with_feed("good", &["http://a/1", "http://a/2", "http://a/3"]));
        let (poller, mut rx) = poller(source, &["good", "bad"], 1);

        let consumer = tokio::spawn(async move {
            let mut links = Vec::new();
            while let Some(article) = rx.recv().await {
                links.push(article.link);
            }
            links
        });

        let report = poller.run_once().await;
        drop(poller);
        let links = consumer.await.unwrap();

        assert_eq!(links, vec!["http://a/1", "http://a/2", "http://a/3"]);
        assert_eq!(
            report,
            PollReport {
                feeds_ok: 1,
                feeds_failed: 1,
                delivered: 3,
                duplicates: 0,
                without_link: 0
            }
        );
    }

    #[tokio::test]
    async fn test_articles_carry_item_metadata() {
        let source = Arc::new(StubSource::default().with_feed("f", &["http://a/1"]));
        let (poller, mut rx) = poller(source, &["f"], 8);
        poller.run_once().await;

        let article = rx.recv().await.unwrap();
        assert_eq!(article.id, crate::identity::derive_id("http://a/1"));
        assert_eq!(article.title, "title of http://a/1");
        assert_eq!(article.published_at, parse_pub_date("Tue, 10 Jun 2014 09:41:00 +0200"));
        assert!(article.body.is_none());
    }

    #[tokio::test]
    async fn test_duplicates_across_feeds_are_delivered_once() {
        let source = Arc::new(
            StubSource::default()
                .with_feed("news", &["http://a/1", "http://a/2"])
                .with_feed("sport", &["http://a/2", "http://a/3"]),
        );
        let (poller, _rx) = poller(source, &["news", "sport"], 8);

        let report = poller.run_once().await;
        assert_eq!(report.delivered, 3);
        assert_eq!(report.duplicates, 1);
    }

    #[tokio::test]
    async fn test_items_without_link_are_counted() {
        let source = Arc::new(StubSource::default().with_feed("f", &["http://a/1", "", "http://a/2", ""]));
        let (poller, mut rx) = poller(source, &["f"], 8);

        let report = poller.run_once().await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.without_link, 2);
        assert_eq!(rx.recv().await.unwrap().link, "http://a/1");
        assert_eq!(rx.recv().await.unwrap().link, "http://a/2");
    }

    #[tokio::test]
    async fn test_custom_link_chooser() {
        let source = Arc::new(StubSource::default().with_feed("f", &["http://a/1?utm=rss"]));
        let (tx, mut rx) = mpsc::channel(8);
        let options = PollerOptions::new(vec!["f".to_string()]).with_link_chooser(Arc::new(|item: &FeedItem| {
            item.link.split('?').next().unwrap_or_default().to_string()
        }));
        let poller = Poller::new(options, source, tx);

        poller.run_once().await;
        assert_eq!(rx.recv().await.unwrap().link, "http://a/1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_feed_times_out() {
        let source = Arc::new(
            StubSource::default()
                .with_feed("slow", &["http://a/1"])
                .with_delay(Duration::from_secs(60)),
        );
        let (tx, _rx) = mpsc::channel(8);
        let options = PollerOptions::new(vec!["slow".to_string()]).with_fetch_timeout(Duration::from_secs(5));
        let poller = Poller::new(options, source, tx);

        let report = poller.run_once().await;
        assert_eq!(report.feeds_failed, 1);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_does_not_hang() {
        let source = Arc::new(StubSource::default().with_feed("f", &["http://a/1", "http://a/2"]));
        let (poller, rx) = poller(source, &["f"], 1);
        drop(rx);

        let report = poller.run_once().await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.feeds_ok, 1);
    }

    #[tokio::test]
    async fn test_stop_right_after_start_waits_for_first_cycle() {
        let source = Arc::new(
            StubSource::default()
                .with_feed("a", &["http://a/1"])
                .with_feed("b", &["http://b/1"])
                .with_delay(Duration::from_millis(50)),
        );
        let (poller, _rx) = poller(Arc::clone(&source), &["a", "b"], 8);

        poller.run_every(Duration::from_secs(3600)).await;
        poller.stop().await;

        assert_eq!(source.started.load(Ordering::SeqCst), 2);
        assert_eq!(source.finished.load(Ordering::SeqCst), 2);
        assert!(!poller.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_every_repeats_until_stopped() {
        let source = Arc::new(StubSource::default().with_feed("f", &["http://a/1"]));
        let (poller, _rx) = poller(Arc::clone(&source), &["f"], 1024);

        poller.run_every(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(poller.is_running().await);
        poller.stop().await;

        let cycles = source.finished.load(Ordering::SeqCst);
        assert!(cycles >= 3, "expected at least 3 cycles, got {cycles}");

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.finished.load(Ordering::SeqCst), cycles);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_every_replaces_first() {
        let source = Arc::new(StubSource::default().with_feed("f", &["http://a/1"]));
        let (poller, _rx) = poller(Arc::clone(&source), &["f"], 1024);

        poller.run_every(Duration::from_secs(10)).await;
        poller.run_every(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        poller.stop().await;

        // One initial cycle per started loop, no stray second loop afterwards.
        let cycles = source.finished.load(Ordering::SeqCst);
        assert_eq!(cycles, 2);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_without_loop_is_noop() {
        let (poller, _rx) = poller(Arc::new(StubSource::default()), &[], 1);
        poller.stop().await;
        assert!(!poller.is_running().await);
        assert_eq!(poller.run_once().await, PollReport::default());
    }
}
