//! File-backed [`DocumentStore`].
//!
//! Each collection is a single JSON array of article documents at
//! `<root>/<collection>.json`. An operation reads the file, applies its
//! change and, for writes, replaces the file atomically by writing a
//! sibling temporary file and renaming it over the original. A missing
//! file is an empty collection.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{Collection, DocumentStore};
use crate::error::StoreError;
use crate::models::Article;
use crate::utils::ensure_writable_dir;

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        ensure_writable_dir(&root).await?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, collection: &str) -> Result<PathBuf, StoreError> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Unavailable(format!("invalid collection name `{collection}`")));
        }
        Ok(self.root.join(format!("{collection}.json")))
    }

    async fn load(&self, collection: &str) -> Result<Collection, StoreError> {
        let path = self.path_for(collection)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Collection::default()),
            Err(e) => return Err(e.into()),
        };
        let articles: Vec<Article> = serde_json::from_slice(&bytes)?;
        Ok(Collection::from_articles(articles))
    }

    #[instrument(level = "debug", skip_all, fields(%collection))]
    async fn save(&self, collection: &str, contents: Collection) -> Result<(), StoreError> {
        let path = self.path_for(collection)?;
        let tmp = path.with_extension("json.tmp");
        let articles = contents.into_articles();
        let json = serde_json::to_vec(&articles)?;
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &path).await?;
        debug!(count = articles.len(), bytes = json.len(), "Saved collection");
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for FileStore {
    async fn read_page(&self, collection: &str, skip: usize, limit: usize) -> Result<Vec<Article>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load(collection).await?.page(skip, limit))
    }

    async fn write_page(&self, collection: &str, articles: &[Article]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut contents = self.load(collection).await?;
        contents.upsert(articles.iter().cloned());
        self.save(collection, contents).await
    }

    async fn filter_new_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load(collection).await?.new_ids(ids))
    }

    async fn read_missing_body(&self, collection: &str, limit: usize) -> Result<Vec<Article>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load(collection).await?.missing_body(limit))
    }
}
