//! Data models for archived articles and the feed items they come from.
//!
//! This module defines the core data structures used throughout the crate:
//! - [`FeedItem`]: One entry of a syndication feed, as read from the wire
//! - [`Article`]: The unit of work and storage, keyed by a link fingerprint
//! - [`StoredBody`]: The article body in one of its three stored shapes
//!
//! Article documents keep the field names the archive has always used on
//! disk: `websiteRaw` for the canonical DEFLATE payload and
//! `site: { data, compressed }` for the legacy base64/zlib payload. In
//! memory the body is a tagged [`StoredBody`] instead of a pair of optional
//! fields, so decoding dispatches on the variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::derive_id;

/// A single item of a syndication feed.
///
/// Consumed read-only by the poller; the archive never stores it directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    /// The item title.
    pub title: String,
    /// The item link (may be relative to the feed URL).
    pub link: String,
    /// The item description or summary.
    pub description: String,
    /// The publication date exactly as it appears in the feed.
    pub date: String,
    /// The item guid, if the feed provides one.
    pub guid: Option<String>,
}

/// Which generation of the stored body format a [`StoredBody`] is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    LegacyA,
    LegacyB,
    Canonical,
}

/// The at-rest representation of an article body.
///
/// Exactly one shape is present on an article at a time. The legacy shapes
/// are only ever read; new bodies are always written as [`StoredBody::Canonical`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredBody {
    /// Base64 over zlib with an explicit flag; `compressed == false` means
    /// `data` holds the raw body verbatim.
    LegacyA { data: Vec<u8>, compressed: bool },
    /// Base64 over zlib, always compressed.
    LegacyB { data: Vec<u8> },
    /// Raw DEFLATE stream.
    Canonical { data: Vec<u8> },
}

impl StoredBody {
    pub fn kind(&self) -> BodyKind {
        match self {
            StoredBody::LegacyA { .. } => BodyKind::LegacyA,
            StoredBody::LegacyB { .. } => BodyKind::LegacyB,
            StoredBody::Canonical { .. } => BodyKind::Canonical,
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.kind() == BodyKind::Canonical
    }
}

/// An archived news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ArticleDocument", into = "ArticleDocument")]
pub struct Article {
    /// Fingerprint of `link`, see [`derive_id`].
    pub id: String,
    pub title: String,
    pub summary: String,
    /// Canonical link of the article page.
    pub link: String,
    /// Publication date; the Unix epoch when the feed date was unparsable.
    pub published_at: DateTime<Utc>,
    /// The stored body, or `None` until the page has been downloaded.
    pub body: Option<StoredBody>,
    /// Set when the document this article was loaded from still carried a
    /// legacy body next to the canonical one. Never serialized; writing the
    /// article back stores the canonical body only.
    pub stale_legacy_body: bool,
}

impl Article {
    /// Build a fresh article (no body yet) whose id is derived from `link`.
    pub fn new(
        link: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let link = link.into();
        Self {
            id: derive_id(&link),
            title: title.into(),
            summary: summary.into(),
            link,
            published_at,
            body: None,
            stale_legacy_body: false,
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body_kind(&self) -> Option<BodyKind> {
        self.body.as_ref().map(StoredBody::kind)
    }
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}\ntitle: {}\nsummary: {}\npublished: {}\nlink: {}",
            self.id,
            self.title,
            self.summary,
            self.published_at.to_rfc3339(),
            self.link
        )
    }
}

/// The on-disk shape of an article document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleDocument {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    pub_date: DateTime<Utc>,
    #[serde(default)]
    link: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    website_raw: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    site: Option<SiteDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SiteDocument {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    data: Option<Vec<u8>>,
    /// Absent on Legacy-B documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compressed: Option<bool>,
}

impl From<ArticleDocument> for Article {
    fn from(doc: ArticleDocument) -> Self {
        // A document carrying both fields is mid-migration; the canonical one wins.
        let stale_legacy_body = doc.website_raw.is_some() && doc.site.is_some();
        let body = match (doc.website_raw, doc.site) {
            (Some(data), _) => Some(StoredBody::Canonical { data }),
            (None, Some(SiteDocument { data: Some(data), compressed: Some(compressed) })) => {
                Some(StoredBody::LegacyA { data, compressed })
            }
            (None, Some(SiteDocument { data: Some(data), compressed: None })) => {
                Some(StoredBody::LegacyB { data })
            }
            _ => None,
        };

        Article {
            id: doc.id,
            title: doc.title,
            summary: doc.summary,
            link: doc.link,
            published_at: doc.pub_date,
            body,
            stale_legacy_body,
        }
    }
}

impl From<Article> for ArticleDocument {
    fn from(article: Article) -> Self {
        let (website_raw, site) = match article.body {
            Some(StoredBody::Canonical { data }) => (Some(data), None),
            Some(StoredBody::LegacyA { data, compressed }) => (
                None,
                Some(SiteDocument {
                    data: Some(data),
                    compressed: Some(compressed),
                }),
            ),
            Some(StoredBody::LegacyB { data }) => (
                None,
                Some(SiteDocument {
                    data: Some(data),
                    compressed: None,
                }),
            ),
            None => (None, None),
        };

        ArticleDocument {
            id: article.id,
            title: article.title,
            summary: article.summary,
            pub_date: article.published_at,
            link: article.link,
            website_raw,
            site,
        }
    }
}

/// Binary fields are stored as standard base64 strings in JSON documents.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
