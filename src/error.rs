//! Error types for the archiver pipeline.
//!
//! Every component reports failures through its own enum so callers can
//! branch on the variant: an article without a downloaded body
//! ([`CodecError::NoBody`]) is an expected condition, while a corrupt
//! payload or an anchor that cannot be located only concerns a single item.
//! [`Error`] aggregates them for the batch jobs and the binary.

use thiserror::Error;

/// Failures while decoding a stored article body.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The article has no body stored yet (not downloaded).
    #[error("no body stored for this article")]
    NoBody,

    /// The stored bytes could not be decoded (bad base64 or DEFLATE stream).
    #[error("corrupt body encoding: {0}")]
    CorruptEncoding(String),

    /// The body could not be compressed for storage.
    #[error("failed to compress body: {0}")]
    Compress(#[source] std::io::Error),
}

impl CodecError {
    pub fn is_no_body(&self) -> bool {
        matches!(self, CodecError::NoBody)
    }
}

/// Failures while locating and materializing a subtree of an HTML document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The stream ended before the named predicate matched a start tag.
    #[error("anchor not found: no element matches `{predicate}`")]
    AnchorNotFound { predicate: String },

    /// The stream ended while the anchor's subtree still had open elements.
    #[error("document truncated with {open} element(s) still open")]
    TruncatedDocument { open: usize },
}

/// Failures of the network fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http status {0}")]
    HttpStatus(u16),

    /// The request exceeded the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("response too large (max {max_bytes} bytes)")]
    TooLarge { max_bytes: u64 },

    #[error("network error: {0}")]
    Network(String),
}

/// Failures while reading a syndication feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to parse feed: {0}")]
    Parse(String),
}

/// Failures of the document store collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures while loading the YAML configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-level error returned by the batch jobs.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
