//! In-memory [`DocumentStore`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Collection, DocumentStore};
use crate::error::StoreError;
use crate::models::Article;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with articles, replacing duplicates by id.
    pub fn insert(&self, collection: &str, articles: Vec<Article>) -> Result<(), StoreError> {
        self.lock()?
            .entry(collection.to_string())
            .or_default()
            .upsert(articles);
        Ok(())
    }

    /// A snapshot of a whole collection in insertion order.
    pub fn articles(&self, collection: &str) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .lock()?
            .get(collection)
            .map(|c| c.clone().into_articles())
            .unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Collection>>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn read_page(&self, collection: &str, skip: usize, limit: usize) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .lock()?
            .get(collection)
            .map(|c| c.page(skip, limit))
            .unwrap_or_default())
    }

    async fn write_page(&self, collection: &str, articles: &[Article]) -> Result<(), StoreError> {
        self.insert(collection, articles.to_vec())
    }

    async fn filter_new_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<String>, StoreError> {
        Ok(match self.lock()?.get(collection) {
            Some(c) => c.new_ids(ids),
            None => ids.to_vec(),
        })
    }

    async fn read_missing_body(&self, collection: &str, limit: usize) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .lock()?
            .get(collection)
            .map(|c| c.missing_body(limit))
            .unwrap_or_default())
    }
}
