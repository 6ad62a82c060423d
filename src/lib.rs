//! # News Archiver
//!
//! An archive pipeline for news sites: poll syndication feeds, store the
//! article metadata, backfill each article's body from the linked page, and
//! keep the stored bodies in one compact encoding.
//!
//! ## Architecture
//!
//! 1. **Polling** ([`poller`]): fetch every feed concurrently and turn items
//!    into [`Article`]s with ids derived from their links ([`identity`])
//! 2. **Ingest** ([`ingest`]): batch the polled articles, drop known ids and
//!    write the new ones to the [`store`]
//! 3. **Download** ([`download`]): fetch pages of articles without a body,
//!    extract the article text ([`extract`]) and store it encoded ([`codec`])
//! 4. **Compaction** ([`compactor`]): migrate bodies stored in the legacy
//!    base64/zlib shapes to the canonical DEFLATE shape
//!
//! Network access goes through [`fetch::Fetcher`] and storage through
//! [`store::DocumentStore`], so every stage can run against in-memory
//! doubles.

pub mod codec;
pub mod compactor;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod poller;
pub mod store;
pub mod utils;

pub use compactor::{CompactReport, Compactor};
pub use config::Config;
pub use download::{DownloadReport, Downloader};
pub use error::{Error, Result};
pub use extract::{Node, Predicate, SiteProfile, extract_subtree};
pub use ingest::{IngestReport, Ingestor};
pub use models::{Article, FeedItem, StoredBody};
pub use poller::{PollReport, Poller, PollerOptions};
