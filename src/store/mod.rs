//! Article persistence.
//!
//! The pipeline talks to storage only through [`DocumentStore`], a small
//! paginated document API keyed by article id. Collections are named per
//! site (`tagi`, `blick`, ...). Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: everything in a map, for tests and embedding
//! - [`FileStore`]: one JSON document per collection on disk
//!
//! Every operation acquires whatever it needs (lock, file) and releases it
//! before returning, on success and on error alike. Failures are returned
//! to the caller as-is; nothing here retries.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::Article;

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `limit` articles starting at position `skip`, in insertion order.
    async fn read_page(&self, collection: &str, skip: usize, limit: usize) -> Result<Vec<Article>, StoreError>;

    /// Insert or replace each article by id. Replaced articles keep their position.
    async fn write_page(&self, collection: &str, articles: &[Article]) -> Result<(), StoreError>;

    /// The subset of `ids` not present in the collection, in input order.
    async fn filter_new_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<String>, StoreError>;

    /// Up to `limit` articles that have no body yet, in insertion order.
    async fn read_missing_body(&self, collection: &str, limit: usize) -> Result<Vec<Article>, StoreError>;
}

/// Articles of one collection in insertion order, indexed by id.
#[derive(Debug, Default, Clone)]
pub(crate) struct Collection {
    articles: Vec<Article>,
    index: HashMap<String, usize>,
}

impl Collection {
    pub(crate) fn from_articles(articles: Vec<Article>) -> Self {
        let mut collection = Collection::default();
        collection.upsert(articles);
        collection
    }

    pub(crate) fn into_articles(self) -> Vec<Article> {
        self.articles
    }

    pub(crate) fn page(&self, skip: usize, limit: usize) -> Vec<Article> {
        self.articles.iter().skip(skip).take(limit).cloned().collect()
    }

    pub(crate) fn upsert(&mut self, articles: impl IntoIterator<Item = Article>) {
        for article in articles {
            match self.index.get(&article.id) {
                Some(&pos) => self.articles[pos] = article,
                None => {
                    self.index.insert(article.id.clone(), self.articles.len());
                    self.articles.push(article);
                }
            }
        }
    }

    pub(crate) fn new_ids(&self, ids: &[String]) -> Vec<String> {
        ids.iter().filter(|id| !self.index.contains_key(*id)).cloned().collect()
    }

    pub(crate) fn missing_body(&self, limit: usize) -> Vec<Article> {
        self.articles
            .iter()
            .filter(|a| !a.has_body())
            .take(limit)
            .cloned()
            .collect()
    }
}
