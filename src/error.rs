//! Typed errors for the fetch, feed, and image-cache layers.
//!
//! Per-item failures are converted to `None` at each pipeline stage
//! boundary; these types exist so the conversion sites can log *why*
//! an item was skipped and so tests can assert on failure classes.

use thiserror::Error;

/// Errors from bounded HTTP fetches and URL unshortening.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-success HTTP status
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// Response body exceeded the byte ceiling
    #[error("response exceeds {max_bytes} bytes: {url}")]
    TooLarge { max_bytes: usize, url: String },

    /// Transport-level failure (timeout, TLS, DNS, connection reset)
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// True for statuses the upstream routinely throws at crawlers
    /// (rate limits, origin hiccups). These are skipped without an
    /// error-level log.
    pub fn is_transient_status(&self) -> bool {
        matches!(
            self,
            FetchError::Status {
                status: 403 | 429 | 500 | 502 | 503,
                ..
            }
        )
    }
}

/// Errors from downloading and parsing one publisher feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Both the HTTPS fetch and the plain-HTTP retry failed
    #[error("feed download failed: {0}")]
    Download(#[source] FetchError),

    /// Bytes did not parse as RSS/Atom
    #[error("feed parse failed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),

    /// Feed parsed but contained no entries
    #[error("feed has no entries: {url}")]
    Empty { url: String },
}

/// Errors from the content-addressed image cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Source image could not be fetched
    #[error("image fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The sandboxed resize-and-pad codec trapped or misbehaved
    #[error("codec failed for {url}")]
    Codec { url: String },

    /// Local cache or blob store I/O failed
    #[error("cache store failed: {0}")]
    Store(#[from] std::io::Error),

    /// Remote existence check failed in a way that should be retried later
    #[error("blob store check failed: {0}")]
    Remote(#[source] Box<dyn std::error::Error + Send + Sync>),
}
