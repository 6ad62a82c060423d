//! Backfilling article bodies.
//!
//! Articles arrive from the feeds with metadata only. The [`Downloader`]
//! picks up articles without a body, fetches their pages concurrently,
//! extracts the article text with the site's [`SiteProfile`] and stores it
//! in the canonical encoding. The updated articles are written back in one
//! batch at the end of the run.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::codec;
use crate::error::Result;
use crate::extract::SiteProfile;
use crate::fetch::Fetcher;
use crate::models::Article;
use crate::store::DocumentStore;
use crate::utils::truncate_for_log;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Articles without a body that were attempted.
    pub candidates: usize,
    pub downloaded: usize,
    pub failed: usize,
}

pub struct Downloader {
    store: Arc<dyn DocumentStore>,
    fetcher: Arc<dyn Fetcher>,
    collection: String,
    profile: SiteProfile,
    concurrency: usize,
}

impl Downloader {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        fetcher: Arc<dyn Fetcher>,
        collection: impl Into<String>,
        profile: SiteProfile,
    ) -> Self {
        Self {
            store,
            fetcher,
            collection: collection.into(),
            profile,
            concurrency: 8,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Download bodies for up to `limit` articles that do not have one.
    ///
    /// # Errors
    ///
    /// Store failures abort the run. Failures of individual articles are
    /// logged and counted in the report.
    #[instrument(level = "info", skip_all, fields(collection = %self.collection, limit))]
    pub async fn run(&self, limit: usize) -> Result<DownloadReport> {
        let candidates = self.store.read_missing_body(&self.collection, limit).await?;
        let mut report = DownloadReport {
            candidates: candidates.len(),
            ..DownloadReport::default()
        };

        let results: Vec<Option<Article>> = stream::iter(candidates)
            .map(|article| async move {
                match self.download(&article).await {
                    Ok(filled) => Some(filled),
                    Err(e) => {
                        warn!(id = %article.id, link = %article.link, error = %e, "Body download failed; skipping article");
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let filled: Vec<Article> = results.into_iter().flatten().collect();
        report.downloaded = filled.len();
        report.failed = report.candidates - report.downloaded;

        if !filled.is_empty() {
            self.store.write_page(&self.collection, &filled).await?;
        }
        info!(
            candidates = report.candidates,
            downloaded = report.downloaded,
            failed = report.failed,
            "Download run finished"
        );
        Ok(report)
    }

    async fn download(&self, article: &Article) -> Result<Article> {
        let page = self.fetcher.fetch(&article.link).await?;
        let text = self.profile.extract_body(&page)?;
        debug!(id = %article.id, body = %truncate_for_log(&text, 120), "Extracted body");

        let mut filled = article.clone();
        filled.body = Some(codec::encode(text.as_bytes())?);
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::extract::Predicate;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;

    struct StubFetcher {
        pages: HashMap<String, &'static str>,
    }

    #[async_trait::async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.pages
                .get(url)
                .map(|page| page.as_bytes().to_vec())
                .ok_or(FetchError::HttpStatus(404))
        }
    }

    fn article(link: &str) -> Article {
        Article::new(link, "title", "summary", DateTime::<Utc>::default())
    }

    #[tokio::test]
    async fn test_fills_bodies_and_skips_failures() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                "tagi",
                vec![article("http://t/ok"), article("http://t/missing"), article("http://t/no-anchor")],
            )
            .unwrap();

        let fetcher = Arc::new(StubFetcher {
            pages: HashMap::from([
                ("http://t/ok".to_string(), r#"<div id="singlePage"><p>Eins</p><p>Zwei</p></div>"#),
                ("http://t/no-anchor".to_string(), "<div>nothing here</div>"),
            ]),
        });
        let profile = SiteProfile::new(vec![Predicate::Id("singlePage".to_string())])
            .with_paragraphs(Predicate::Tag("p".to_string()));
        let downloader = Downloader::new(store.clone(), fetcher, "tagi", profile);

        let report = downloader.run(10).await.unwrap();
        assert_eq!(
            report,
            DownloadReport {
                candidates: 3,
                downloaded: 1,
                failed: 2
            }
        );

        let articles = store.articles("tagi").unwrap();
        let ok = articles.iter().find(|a| a.link == "http://t/ok").unwrap();
        assert_eq!(codec::decode(ok.body.as_ref()).unwrap(), b"Eins\nZwei");
        assert!(ok.body.as_ref().unwrap().is_canonical());
        assert_eq!(articles.iter().filter(|a| a.has_body()).count(), 1);

        // Only the failures are left for the next run.
        assert_eq!(downloader.run(10).await.unwrap().candidates, 2);
    }
}
