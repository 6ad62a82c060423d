//! Persisting polled articles.
//!
//! The [`Ingestor`] is the consumer end of the poller's channel. It gathers
//! articles into batches, drops the ones the store already knows, and
//! writes the rest in a single call per batch. A batch is flushed when it is
//! full, when the channel has been quiet for the idle period, and when the
//! channel closes.
//!
//! A store failure only loses the current batch: it is logged and
//! ingestion continues. The items come back with the next poll cycle
//! because nothing of them was written.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::error::StoreError;
use crate::models::Article;
use crate::store::DocumentStore;

/// Totals over the lifetime of one [`Ingestor::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub received: usize,
    pub stored: usize,
    /// Already in the store or repeated within a batch.
    pub known: usize,
    pub failed_batches: usize,
}

pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    collection: String,
    batch_size: usize,
    idle_flush: Duration,
}

impl Ingestor {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            batch_size: 100,
            idle_flush: Duration::from_secs(2),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_idle_flush(mut self, idle_flush: Duration) -> Self {
        self.idle_flush = idle_flush;
        self
    }

    /// Consume `input` until it closes.
    #[instrument(level = "info", skip_all, fields(collection = %self.collection))]
    pub async fn run(&self, mut input: mpsc::Receiver<Article>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut batch = Vec::with_capacity(self.batch_size);

        loop {
            let next = if batch.is_empty() {
                input.recv().await
            } else {
                match tokio::time::timeout(self.idle_flush, input.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.flush(&mut batch, &mut report).await;
                        continue;
                    }
                }
            };

            let Some(article) = next else { break };
            report.received += 1;
            batch.push(article);
            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut report).await;
            }
        }

        self.flush(&mut batch, &mut report).await;
        info!(
            received = report.received,
            stored = report.stored,
            known = report.known,
            failed_batches = report.failed_batches,
            "Ingestion finished"
        );
        report
    }

    async fn flush(&self, batch: &mut Vec<Article>, report: &mut IngestReport) {
        if batch.is_empty() {
            return;
        }
        let pending = batch.len();
        match self.store_new(std::mem::take(batch)).await {
            Ok(stored) => {
                report.stored += stored;
                report.known += pending - stored;
            }
            Err(e) => {
                report.failed_batches += 1;
                error!(error = %e, dropped = pending, "Failed to store batch; dropping it");
            }
        }
    }

    /// Write the articles of `batch` the store does not have yet; returns how many.
    pub async fn store_new(&self, batch: Vec<Article>) -> Result<usize, StoreError> {
        let unique: Vec<Article> = batch.into_iter().unique_by(|a| a.id.clone()).collect();
        let ids: Vec<String> = unique.iter().map(|a| a.id.clone()).collect();
        let fresh: HashSet<String> = self
            .store
            .filter_new_ids(&self.collection, &ids)
            .await?
            .into_iter()
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let new_articles: Vec<Article> = unique.into_iter().filter(|a| fresh.contains(&a.id)).collect();
        self.store.write_page(&self.collection, &new_articles).await?;
        info!(count = new_articles.len(), "Stored new articles");
        Ok(new_articles.len())
    }
}
