//! Raw network fetch.
//!
//! Everything that goes over the wire (feeds and article pages) goes through
//! the [`Fetcher`] trait so the poller and the downloader can be driven by
//! canned responses in tests. [`HttpFetcher`] is the `reqwest` implementation
//! used by the binary.
//!
//! Every request is bounded: by a total timeout (30 seconds unless
//! configured otherwise) and by a maximum body size.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::USER_AGENT;
use tracing::{debug, instrument};

use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Total time allowed for one request, body included.
    pub timeout: Duration,
    /// Responses larger than this are rejected with [`FetchError::TooLarge`].
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 5 * 1024 * 1024,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` and return the complete response body.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout(self.settings.timeout);
        }
        FetchError::Network(err.to_string())
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|err| FetchError::InvalidUrl(format!("{url}: {err}")))?;

        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, &self.settings.user_agent)
            .send()
            .await
            .map_err(|err| self.map_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let max_bytes = self.settings.max_bytes;
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(FetchError::TooLarge { max_bytes });
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| self.map_error(err))?;
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(FetchError::TooLarge { max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(bytes = bytes.len(), "Fetched");
        Ok(bytes)
    }
}
