//! YAML configuration.
//!
//! The binary reads a single file describing where the store lives, how
//! the poller behaves and which sites are archived. A minimal file:
//!
//! ```yaml
//! store:
//!   path: ./archive
//! sites:
//!   - name: tagi
//!     collection: tagi
//!     feeds: ["http://www.tagesanzeiger.ch/rss.html"]
//!     selector: ["#singlePage"]
//!     paragraphs: p
//! ```
//!
//! Everything else has defaults. [`Config::from_yaml_str`] validates the
//! whole file up front so a bad regex or feed URL is reported at startup
//! rather than in the middle of a run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::ConfigError;
use crate::extract::{BodyFormat, Predicate, SiteProfile};
use crate::feed::LinkStrategy;
use crate::fetch::FetchSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub compactor: CompactorConfig,
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one JSON file per collection.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub channel_capacity: usize,
    pub fetch_timeout_secs: u64,
    pub max_body_bytes: u64,
    pub user_agent: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            interval_secs: 3600,
            channel_capacity: 256,
            fetch_timeout_secs: fetch.timeout.as_secs(),
            max_body_bytes: fetch.max_bytes,
            user_agent: fetch.user_agent,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: self.fetch_timeout(),
            max_bytes: self.max_body_bytes,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactorConfig {
    pub page_size: usize,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            page_size: crate::compactor::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    /// Store collection the site's articles live in.
    pub collection: String,
    pub feeds: Vec<String>,
    #[serde(default)]
    pub link: LinkStrategy,
    /// Predicate path to the element holding the article body.
    pub selector: Vec<Predicate>,
    #[serde(default)]
    pub paragraphs: Option<Predicate>,
    #[serde(default)]
    pub body_format: BodyFormat,
    /// Legacy bodies are only migrated for links matching this regex.
    #[serde(default)]
    pub legacy_link_pattern: Option<String>,
}

impl SiteConfig {
    pub fn profile(&self) -> SiteProfile {
        SiteProfile {
            selector: self.selector.clone(),
            paragraphs: self.paragraphs.clone(),
            format: self.body_format,
        }
    }

    pub fn legacy_link_regex(&self) -> Result<Option<Regex>, ConfigError> {
        self.legacy_link_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    ConfigError::Invalid(format!("site `{}`: bad legacy_link_pattern: {e}", self.name))
                })
            })
            .transpose()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |what: String| ConfigError::Invalid(format!("site `{}`: {what}", self.name));

        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("site with empty name".to_string()));
        }
        let collection_ok = !self.collection.is_empty()
            && self
                .collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !collection_ok {
            return Err(invalid(format!("invalid collection name `{}`", self.collection)));
        }
        if self.selector.is_empty() {
            return Err(invalid("selector must name at least one predicate".to_string()));
        }
        for feed in &self.feeds {
            let url = Url::parse(feed).map_err(|e| invalid(format!("bad feed url `{feed}`: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid(format!("feed url `{feed}` is not http(s)")));
            }
        }
        self.legacy_link_regex()?;
        Ok(())
    }
}

impl Config {
    /// Read and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        info!(path = %path.display(), sites = config.sites.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.channel_capacity == 0 {
            return Err(ConfigError::Invalid("poller.channel_capacity must be positive".to_string()));
        }
        if self.poller.interval_secs == 0 {
            return Err(ConfigError::Invalid("poller.interval_secs must be positive".to_string()));
        }
        if self.poller.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("poller.fetch_timeout_secs must be positive".to_string()));
        }
        if self.poller.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("poller.max_body_bytes must be positive".to_string()));
        }
        if self.compactor.page_size == 0 {
            return Err(ConfigError::Invalid("compactor.page_size must be positive".to_string()));
        }

        let mut names = HashSet::new();
        for site in &self.sites {
            site.validate()?;
            if !names.insert(site.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate site `{}`", site.name)));
            }
        }
        Ok(())
    }

    /// The named site, or every site when `name` is `None`.
    pub fn select_sites(&self, name: Option<&str>) -> Result<Vec<&SiteConfig>, ConfigError> {
        match name {
            None => Ok(self.sites.iter().collect()),
            Some(name) => self
                .sites
                .iter()
                .find(|site| site.name == name)
                .map(|site| vec![site])
                .ok_or_else(|| ConfigError::Invalid(format!("unknown site `{name}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = r##"
store:
  path: ./archive
poller:
  interval_secs: 600
sites:
  - name: tagi
    collection: tagi
    feeds:
      - http://www.tagesanzeiger.ch/rss.html
    selector: ["#singlePage"]
    paragraphs: p
  - name: blick
    collection: blick
    feeds: ["http://www.blick.ch/news/rss.xml"]
    link: guid
    selector: [".article"]
    body_format: html
    legacy_link_pattern: '(.+)-(\d+)$'
"##;

    fn with_site_field(field: &str) -> String {
        format!("store: {{ path: x }}\nsites:\n  - name: s\n    collection: s\n    feeds: []\n    selector: [p]\n    {field}\n")
    }

    #[test]
    fn test_parses_and_fills_defaults() {
        let config = Config::from_yaml_str(YAML).unwrap();
        assert_eq!(config.store.path, PathBuf::from("./archive"));
        assert_eq!(config.poller.interval(), Duration::from_secs(600));
        assert_eq!(config.poller.channel_capacity, 256);
        assert_eq!(config.poller.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.compactor.page_size, 100);

        let tagi = &config.sites[0];
        assert_eq!(tagi.link, LinkStrategy::Item);
        assert_eq!(
            tagi.profile(),
            SiteProfile::new(vec![Predicate::Id("singlePage".to_string())])
                .with_paragraphs(Predicate::Tag("p".to_string()))
        );
        assert!(tagi.legacy_link_regex().unwrap().is_none());

        let blick = &config.sites[1];
        assert_eq!(blick.link, LinkStrategy::Guid);
        assert_eq!(blick.profile().format, BodyFormat::Html);
        assert!(blick.legacy_link_regex().unwrap().unwrap().is_match("http://www.blick.ch/a-12"));
    }

    #[test]
    fn test_select_sites() {
        let config = Config::from_yaml_str(YAML).unwrap();
        assert_eq!(config.select_sites(None).unwrap().len(), 2);
        assert_eq!(config.select_sites(Some("blick")).unwrap()[0].collection, "blick");
        assert!(matches!(config.select_sites(Some("nzz")), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_invalid_values() {
        for field in [
            "legacy_link_pattern: '(unclosed'",
            "paragraphs: 'a>b'",
        ] {
            let err = Config::from_yaml_str(&with_site_field(field)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid(_) | ConfigError::Yaml(_)),
                "{field}: {err}"
            );
        }

        let bad_feed = "store: { path: x }\nsites:\n  - { name: s, collection: s, feeds: ['ftp://x/rss'], selector: [p] }\n";
        assert!(matches!(Config::from_yaml_str(bad_feed), Err(ConfigError::Invalid(_))));

        let bad_collection = "store: { path: x }\nsites:\n  - { name: s, collection: '../s', feeds: [], selector: [p] }\n";
        assert!(matches!(Config::from_yaml_str(bad_collection), Err(ConfigError::Invalid(_))));

        let no_selector = "store: { path: x }\nsites:\n  - { name: s, collection: s, feeds: [], selector: [] }\n";
        assert!(matches!(Config::from_yaml_str(no_selector), Err(ConfigError::Invalid(_))));

        let zero_page = "store: { path: x }\ncompactor: { page_size: 0 }\nsites: []\n";
        assert!(matches!(Config::from_yaml_str(zero_page), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_duplicate_sites() {
        let yaml = "store: { path: x }\nsites:\n  - { name: s, collection: a, feeds: [], selector: [p] }\n  - { name: s, collection: b, feeds: [], selector: [p] }\n";
        assert!(matches!(Config::from_yaml_str(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_example_config_is_valid() {
        let text = include_str!("../config.example.yaml");
        let config = Config::from_yaml_str(text).unwrap();
        let names: Vec<&str> = config.sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["tagi", "blick", "min20"]);
        assert!(config.sites.iter().all(|s| !s.feeds.is_empty()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
