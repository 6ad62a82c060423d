//! Migration of stored bodies to the canonical encoding.
//!
//! The [`Compactor`] walks one collection page by page (skip/limit, 100
//! articles per page unless configured otherwise) until it reads an empty
//! page. Every article still holding a legacy body is decoded, reduced to
//! its article text with the site's [`SiteProfile`], re-encoded canonically,
//! and the legacy body is dropped. Articles loaded from documents that hold
//! a canonical body and still carry the legacy one are collapsed to the
//! canonical body alone. A page with at least one migrated or collapsed
//! article is written back whole, in one call.
//!
//! Failures of single articles (corrupt payloads, pages the selector cannot
//! find its anchor in) are logged and counted; the article stays in its
//! legacy shape and is retried by the next run. The cursor always advances
//! by the page size, so a poison article can never stall the job. Store
//! failures end the run with an error.
//!
//! Running the compactor twice is idempotent: the second run finds nothing
//! but canonical bodies and migrates nothing.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error, info, instrument, warn};

use crate::codec;
use crate::error::{CodecError, Error, Result};
use crate::extract::SiteProfile;
use crate::models::{Article, BodyKind, StoredBody};
use crate::store::DocumentStore;
use crate::utils::link_matches;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactReport {
    pub pages: usize,
    pub scanned: usize,
    pub migrated: usize,
    pub already_canonical: usize,
    /// Canonical articles whose document still carried a legacy body.
    pub collapsed: usize,
    pub no_body: usize,
    /// Legacy articles whose link does not match the legacy link pattern.
    pub skipped_link: usize,
    pub failed: usize,
}

enum Outcome {
    Migrated,
    Collapsed,
    AlreadyCanonical,
    NoBody,
    SkippedLink,
    Failed,
}

pub struct Compactor {
    store: Arc<dyn DocumentStore>,
    collection: String,
    profile: SiteProfile,
    page_size: usize,
    legacy_link_pattern: Option<Regex>,
}

impl Compactor {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>, profile: SiteProfile) -> Self {
        Self {
            store,
            collection: collection.into(),
            profile,
            page_size: DEFAULT_PAGE_SIZE,
            legacy_link_pattern: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Only migrate legacy articles whose link matches `pattern`.
    pub fn with_legacy_link_pattern(mut self, pattern: Regex) -> Self {
        self.legacy_link_pattern = Some(pattern);
        self
    }

    /// Migrate the whole collection.
    ///
    /// # Errors
    ///
    /// Returns the store error when reading or writing a page fails.
    #[instrument(level = "info", skip_all, fields(collection = %self.collection, page_size = self.page_size))]
    pub async fn run(&self) -> Result<CompactReport> {
        let mut report = CompactReport::default();
        let mut skip = 0;

        loop {
            let page = self
                .store
                .read_page(&self.collection, skip, self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            report.pages += 1;
            self.compact_page(skip, page, &mut report).await?;
            skip += self.page_size;
        }

        info!(
            pages = report.pages,
            scanned = report.scanned,
            migrated = report.migrated,
            already_canonical = report.already_canonical,
            collapsed = report.collapsed,
            no_body = report.no_body,
            skipped_link = report.skipped_link,
            failed = report.failed,
            "Compaction finished"
        );
        Ok(report)
    }

    #[instrument(level = "info", skip_all, fields(skip))]
    async fn compact_page(&self, skip: usize, mut page: Vec<Article>, report: &mut CompactReport) -> Result<()> {
        let mut changed = 0;
        for article in &mut page {
            report.scanned += 1;
            match self.migrate(article) {
                Outcome::Migrated => {
                    report.migrated += 1;
                    changed += 1;
                }
                Outcome::Collapsed => {
                    report.collapsed += 1;
                    changed += 1;
                }
                Outcome::AlreadyCanonical => report.already_canonical += 1,
                Outcome::NoBody => report.no_body += 1,
                Outcome::SkippedLink => report.skipped_link += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        if changed == 0 {
            debug!(count = page.len(), "Nothing to migrate on page");
            return Ok(());
        }

        if let Err(e) = self.store.write_page(&self.collection, &page).await {
            error!(error = %e, "Failed to write back page");
            return Err(e.into());
        }
        info!(changed, count = page.len(), "Pushed page");
        Ok(())
    }

    fn migrate(&self, article: &mut Article) -> Outcome {
        match article.body_kind() {
            None => return Outcome::NoBody,
            Some(BodyKind::Canonical) if article.stale_legacy_body => {
                article.stale_legacy_body = false;
                return Outcome::Collapsed;
            }
            Some(BodyKind::Canonical) => return Outcome::AlreadyCanonical,
            Some(BodyKind::LegacyA | BodyKind::LegacyB) => {}
        }
        if !link_matches(self.legacy_link_pattern.as_ref(), &article.link) {
            debug!(id = %article.id, link = %article.link, "Link not in legacy scheme; leaving article");
            return Outcome::SkippedLink;
        }

        match self.canonical_body(article) {
            Ok(body) => {
                article.body = Some(body);
                Outcome::Migrated
            }
            Err(Error::Codec(CodecError::NoBody)) => Outcome::NoBody,
            Err(e) => {
                warn!(id = %article.id, error = %e, "Failed to migrate article; leaving it unchanged");
                Outcome::Failed
            }
        }
    }

    fn canonical_body(&self, article: &Article) -> Result<StoredBody> {
        let raw = codec::decode(article.body.as_ref())?;
        let text = self.profile.extract_body(&raw)?;
        Ok(codec::encode(text.as_bytes())?)
    }
}
