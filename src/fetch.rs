//! Bounded, timeout-bound HTTP fetching.
//!
//! [`HttpFetcher`] owns the two pooled reqwest clients every
//! network-touching stage goes through: a general client for feeds, pages,
//! and images, and a redirect-following client with a short timeout for
//! URL unshortening. Both enforce an explicit per-request timeout; body
//! reads are streamed against a byte ceiling so an oversize response is
//! abandoned mid-transfer instead of buffered whole.

use crate::config::{Config, USER_AGENT};
use crate::error::FetchError;
use futures::StreamExt;
use tracing::debug;
use url::Url;

/// Pooled HTTP client pair for all pipeline fetches.
///
/// Constructed once in `main` and shared by reference; there is no ambient
/// global session.
pub struct HttpFetcher {
    client: reqwest::Client,
    unshorten_client: reqwest::Client,
}

impl HttpFetcher {
    /// Build the client pair from pipeline configuration.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;
        let unshorten_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.unshorten_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            unshorten_client,
        })
    }

    /// GET a URL, enforcing a byte ceiling on the response body.
    ///
    /// The ceiling is checked against `Content-Length` when the server
    /// sends one, and again while streaming the body, so a lying or
    /// chunked response cannot blow past it.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to fetch
    /// * `max_bytes` - Hard ceiling on the body size
    ///
    /// # Errors
    ///
    /// [`FetchError::Status`] on non-2xx, [`FetchError::TooLarge`] when the
    /// ceiling is hit, [`FetchError::Transport`] on timeout/TLS/connection
    /// failures.
    pub async fn get_with_max_size(
        &self,
        url: &str,
        max_bytes: usize,
    ) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > max_bytes {
                return Err(FetchError::TooLarge {
                    max_bytes,
                    url: url.to_string(),
                });
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > max_bytes {
                return Err(FetchError::TooLarge {
                    max_bytes,
                    url: url.to_string(),
                });
            }
            body.extend_from_slice(&chunk);
        }
        debug!(url, bytes = body.len(), "Fetched");
        Ok(body)
    }

    /// GET with a plain-HTTP retry: on any failure of the original URL,
    /// rewrite the scheme to `http` and try exactly once more.
    ///
    /// Several publishers serve broken TLS on hosts whose feeds are still
    /// fine over plain HTTP; the retry keeps them ingestable.
    pub async fn get_with_scheme_fallback(
        &self,
        url: &str,
        max_bytes: usize,
    ) -> Result<Vec<u8>, FetchError> {
        match self.get_with_max_size(url, max_bytes).await {
            Ok(body) => Ok(body),
            Err(first_err) => {
                let downgraded = match rewrite_scheme(url, "http") {
                    Some(u) => u,
                    None => return Err(first_err),
                };
                debug!(url, %downgraded, "Retrying over plain HTTP");
                self.get_with_max_size(&downgraded, max_bytes).await
            }
        }
    }

    /// Resolve a link through its redirect chain and return the final URL.
    ///
    /// Any network or redirect error fails the article; the caller drops it.
    pub async fn unshorten(&self, link: &str) -> Result<Url, FetchError> {
        let response = self.unshorten_client.get(link).send().await?;
        Ok(response.url().clone())
    }
}

/// Rewrite the scheme of an absolute URL, returning `None` when the URL
/// does not parse or the scheme swap is rejected.
pub fn rewrite_scheme(url: &str, scheme: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_scheme(scheme).ok()?;
    Some(parsed.to_string())
}

/// Prefix a bare domain with `https://`. Domains arrive scheme-less from
/// the publisher list.
pub fn ensure_scheme(domain: &str) -> String {
    if domain.starts_with("http") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    }
}
