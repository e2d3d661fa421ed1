use crate::feed::parser::parse_items;
use crate::types::Item;
use futures::StreamExt;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, DNT, USER_AGENT};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

/// Candidate `Accept-Language` values; one is picked per request.
const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,de;q=0.6",
    "en;q=0.9,fr;q=0.7",
    "en-CA,en;q=0.9,fr-CA;q=0.6",
];

/// Probability that a request carries `DNT: 1`.
const DNT_PROBABILITY: f64 = 0.3;

/// Errors that can occur while fetching a single source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The whole fetch exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// The run's cancellation token fired before the fetch finished
    #[error("Fetch cancelled")]
    Cancelled,
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Response too large")]
    ResponseTooLarge,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Fetches one source and normalizes its entries into [`Item`]s.
///
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch and parse one feed.
    ///
    /// The timeout covers the request, the body read and parsing. Cancelling
    /// `cancel` aborts the fetch with [`FetchError::Cancelled`].
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - the whole operation exceeded the timeout
    /// - [`FetchError::Cancelled`] - the token fired first
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::Parse`] - body is not RSS or Atom
    /// - [`FetchError::Network`] / [`FetchError::ResponseTooLarge`] - transport problems
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
        name: &str,
    ) -> Result<Vec<Item>, FetchError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.fetch_inner(url, name)) => {
                outcome.unwrap_or(Err(FetchError::Timeout))
            }
        };

        match &result {
            Ok(items) => tracing::debug!(source = %name, url = %url, items = items.len(), "Fetched source"),
            Err(e) => tracing::warn!(source = %name, url = %url, error = %e, "Source fetch failed"),
        }
        result
    }

    async fn fetch_inner(&self, url: &str, name: &str) -> Result<Vec<Item>, FetchError> {
        let headers = request_headers(&mut rand::thread_rng());
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        parse_items(&bytes, name).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Build the per-request header set.
///
/// `Accept-Language` and `DNT` vary between requests so that consecutive
/// fetches do not carry identical fingerprints. This is cosmetic only.
pub(crate) fn request_headers<R: Rng>(rng: &mut R) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));

    let language = ACCEPT_LANGUAGES[rng.gen_range(0..ACCEPT_LANGUAGES.len())];
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));

    if rng.gen_bool(DNT_PROBABILITY) {
        headers.insert(DNT, HeaderValue::from_static("1"));
    }
    headers
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
