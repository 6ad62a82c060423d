//! Syndication feed reading.
//!
//! [`FeedSource`] turns a feed URL into its items. [`HttpFeedSource`]
//! downloads the feed through a [`Fetcher`] and parses it with
//! [`parse_feed`], which understands RSS 2.0, RSS 1.0 (RDF) and Atom.
//!
//! Item links are resolved against the feed URL, so relative links in a
//! feed become absolute before they reach the poller. Guids are opaque and
//! left as they are. Which of an item's URLs identifies the article is
//! decided by a [`LinkStrategy`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::FeedError;
use crate::fetch::Fetcher;
use crate::models::FeedItem;

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Read every item of the feed at `url`, in document order.
    async fn read_feed(&self, url: &str) -> Result<Vec<FeedItem>, FeedError>;
}

/// Reads feeds over HTTP.
pub struct HttpFeedSource {
    fetcher: Arc<dyn Fetcher>,
}

impl HttpFeedSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait::async_trait]
impl FeedSource for HttpFeedSource {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn read_feed(&self, url: &str) -> Result<Vec<FeedItem>, FeedError> {
        let bytes = self.fetcher.fetch(url).await?;
        let mut items = parse_feed(&bytes)?;
        if let Ok(base) = Url::parse(url) {
            for item in &mut items {
                item.link = resolve(&base, &item.link);
            }
        }
        debug!(count = items.len(), "Parsed feed");
        Ok(items)
    }
}

fn resolve(base: &Url, link: &str) -> String {
    let link = link.trim();
    if link.is_empty() {
        return String::new();
    }
    base.join(link).map(String::from).unwrap_or_else(|_| link.to_string())
}

/// How the canonical link of an article is chosen from its feed item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStrategy {
    /// The item's `link`.
    #[default]
    Item,
    /// The item's `guid` when it is an http(s) URL, otherwise the `link`.
    Guid,
}

impl LinkStrategy {
    pub fn choose(self, item: &FeedItem) -> String {
        match self {
            LinkStrategy::Item => item.link.clone(),
            LinkStrategy::Guid => item
                .guid
                .as_deref()
                .filter(|guid| {
                    Url::parse(guid).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
                })
                .unwrap_or(&item.link)
                .to_string(),
        }
    }
}

/// Parse a feed date.
///
/// RSS uses RFC 2822 and Atom RFC 3339. Anything else yields the Unix epoch;
/// an unreadable date never rejects the item.
pub fn parse_pub_date(date: &str) -> DateTime<Utc> {
    let date = date.trim();
    DateTime::parse_from_rfc2822(date)
        .or_else(|_| DateTime::parse_from_rfc3339(date))
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Parse an RSS 2.0, RSS 1.0 or Atom document into its items.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, FeedError> {
    let xml = std::str::from_utf8(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;
    let root = root_element(xml)?;

    let items = match root.as_str() {
        "rss" => {
            let rss: Rss = from_xml(xml)?;
            rss.channel.items.into_iter().map(FeedItem::from).collect()
        }
        "rdf:RDF" | "RDF" => {
            let rdf: Rdf = from_xml(xml)?;
            rdf.items.into_iter().map(FeedItem::from).collect()
        }
        "feed" => {
            let atom: AtomFeed = from_xml(xml)?;
            atom.entries.into_iter().map(FeedItem::from).collect()
        }
        other => return Err(FeedError::Parse(format!("unsupported feed root element <{other}>"))),
    };
    Ok(items)
}

fn from_xml<'de, T: Deserialize<'de>>(xml: &'de str) -> Result<T, FeedError> {
    quick_xml::de::from_str(xml).map_err(|e| FeedError::Parse(e.to_string()))
}

/// Name of the document element.
fn root_element(xml: &str) -> Result<String, FeedError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(FeedError::Parse("document has no root element".to_string())),
            Err(e) => return Err(FeedError::Parse(e.to_string())),
            Ok(_) => {}
        }
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct Rdf {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RssItem {
    title: Text,
    link: Text,
    description: Text,
    #[serde(rename = "pubDate")]
    pub_date: Text,
    #[serde(rename = "dc:date", alias = "date")]
    dc_date: Text,
    guid: Option<Text>,
}

impl From<RssItem> for FeedItem {
    fn from(item: RssItem) -> Self {
        let date = if item.pub_date.is_empty() {
            item.dc_date.value
        } else {
            item.pub_date.value
        };
        FeedItem {
            title: item.title.value.trim().to_string(),
            link: item.link.value.trim().to_string(),
            description: item.description.value.trim().to_string(),
            date: date.trim().to_string(),
            guid: item.guid.map(|g| g.value.trim().to_string()).filter(|g| !g.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AtomEntry {
    title: Text,
    id: Text,
    #[serde(rename = "link")]
    links: Vec<AtomLink>,
    summary: Text,
    content: Text,
    published: Text,
    updated: Text,
}

#[derive(Debug, Default, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

impl From<AtomEntry> for FeedItem {
    fn from(entry: AtomEntry) -> Self {
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();
        let description = if entry.summary.is_empty() {
            entry.content.value
        } else {
            entry.summary.value
        };
        let date = if entry.published.is_empty() {
            entry.updated.value
        } else {
            entry.published.value
        };
        FeedItem {
            title: entry.title.value.trim().to_string(),
            link,
            description: description.trim().to_string(),
            date: date.trim().to_string(),
            guid: Some(entry.id.value.trim().to_string()).filter(|id| !id.is_empty()),
        }
    }
}

/// Text content of an element, ignoring its attributes.
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

impl Text {
    fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0">
  <channel>
    <title>Tages-Anzeiger</title>
    <link>http://www.tagesanzeiger.ch</link>
    <item>
      <title>Erster &amp; bester</title>
      <link>http://www.tagesanzeiger.ch/zuerich/story/1</link>
      <description><![CDATA[<p>Lead</p>]]></description>
      <pubDate>Tue, 10 Jun 2014 09:41:00 +0200</pubDate>
      <guid isPermaLink="false">tagi-1</guid>
    </item>
    <item>
      <title>Zweiter</title>
      <link>/schweiz/story/2</link>
      <pubDate>gestern</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Blick</title>
  <entry>
    <title type="html">Atom Eintrag</title>
    <id>urn:uuid:1</id>
    <link rel="self" href="http://www.blick.ch/api/1"/>
    <link rel="alternate" href="http://www.blick.ch/news/artikel-123"/>
    <summary>Kurz</summary>
    <updated>2014-06-10T07:41:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items_in_order() {
        let items = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            FeedItem {
                title: "Erster & bester".to_string(),
                link: "http://www.tagesanzeiger.ch/zuerich/story/1".to_string(),
                description: "<p>Lead</p>".to_string(),
                date: "Tue, 10 Jun 2014 09:41:00 +0200".to_string(),
                guid: Some("tagi-1".to_string()),
            }
        );
        assert_eq!(items[1].link, "/schweiz/story/2");
        assert_eq!(items[1].guid, None);
    }

    #[test]
    fn test_parse_atom_prefers_alternate_link() {
        let items = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Atom Eintrag");
        assert_eq!(items[0].link, "http://www.blick.ch/news/artikel-123");
        assert_eq!(items[0].description, "Kurz");
        assert_eq!(items[0].date, "2014-06-10T07:41:00Z");
        assert_eq!(items[0].guid.as_deref(), Some("urn:uuid:1"));
    }

    #[test]
    fn test_parse_rdf() {
        let rdf = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel><title>20 Minuten</title></channel>
  <item><title>RDF</title><link>http://www.20min.ch/a</link><dc:date>2014-06-10T07:41:00Z</dc:date></item>
</rdf:RDF>"#;
        let items = parse_feed(rdf.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].date, "2014-06-10T07:41:00Z");
    }

    #[test]
    fn test_empty_channel() {
        let items = parse_feed(b"<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_rejects_non_feeds() {
        assert!(matches!(parse_feed(b"<html><body/></html>"), Err(FeedError::Parse(_))));
        assert!(matches!(parse_feed(b""), Err(FeedError::Parse(_))));
        assert!(matches!(parse_feed(&[0xff, 0xfe]), Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_parse_pub_date() {
        let expected = Utc.with_ymd_and_hms(2014, 6, 10, 7, 41, 0).unwrap();
        assert_eq!(parse_pub_date("Tue, 10 Jun 2014 09:41:00 +0200"), expected);
        assert_eq!(parse_pub_date("2014-06-10T07:41:00Z"), expected);
        assert_eq!(parse_pub_date("gestern"), DateTime::<Utc>::default());
        assert_eq!(parse_pub_date(""), Utc.timestamp_opt(0, 0).unwrap());
    }

    #[test]
    fn test_link_strategy() {
        let mut item = FeedItem {
            link: "http://www.20min.ch/story/1".to_string(),
            guid: Some("http://www.20min.ch/story/1?ref=rss".to_string()),
            ..FeedItem::default()
        };
        assert_eq!(LinkStrategy::Item.choose(&item), "http://www.20min.ch/story/1");
        assert_eq!(LinkStrategy::Guid.choose(&item), "http://www.20min.ch/story/1?ref=rss");

        item.guid = Some("tagi-1".to_string());
        assert_eq!(LinkStrategy::Guid.choose(&item), "http://www.20min.ch/story/1");
        item.guid = None;
        assert_eq!(LinkStrategy::Guid.choose(&item), "http://www.20min.ch/story/1");
    }

    #[test]
    fn test_resolve_relative_links() {
        let base = Url::parse("http://www.tagesanzeiger.ch/zuerich/rss.html").unwrap();
        assert_eq!(resolve(&base, "/schweiz/story/2"), "http://www.tagesanzeiger.ch/schweiz/story/2");
        assert_eq!(resolve(&base, "http://other.ch/x"), "http://other.ch/x");
        assert_eq!(resolve(&base, "  "), "");
    }
}
