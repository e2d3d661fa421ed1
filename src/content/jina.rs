use super::{ContentError, ContentExtractor};
use crate::util::validate_url;
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BASE_URL: &str = "https://r.jina.ai";

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// CSS selectors targeting main article content across common blog platforms.
const TARGET_SELECTORS: &str =
    "article, .entry-content, .post-content, .article-content, .post-body, main .content, main";

/// Below this many bytes the selector result is treated as a miss and the
/// page is requested again without it.
const MIN_CONTENT_LEN: usize = 200;

/// Extractor backed by the jina.ai reader endpoint (`<base>/<article url>`),
/// which returns a markdown rendering of the article.
pub struct JinaExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for JinaExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinaExtractor")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl JinaExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
        }
    }

    /// Point at a different reader endpoint. Plain HTTP is only accepted for
    /// localhost, so a key is never sent in the clear.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ContentError> {
        let base = base_url.trim_end_matches('/');
        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS extractor base URL");
                return Err(ContentError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS extractor base URL (localhost only)");
        }
        self.base_url = base.to_string();
        Ok(self)
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty()).map(SecretString::from);
        self
    }

    /// The key is only attached for the official host.
    fn is_official(&self) -> bool {
        self.base_url == DEFAULT_BASE_URL
    }

    async fn request(&self, reader_url: &str, use_selector: bool) -> Result<String, ContentError> {
        let mut request = self.client.get(reader_url);
        if use_selector {
            request = request.header("X-Target-Selector", TARGET_SELECTORS);
        }
        if let (Some(key), true) = (&self.api_key, self.is_official()) {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ContentError::Timeout)?
            .map_err(ContentError::Network)?;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        read_limited_text(response, MAX_CONTENT_SIZE).await
    }

    async fn extract_inner(&self, url: &str) -> Result<String, ContentError> {
        let target = validate_url(url)?;
        let reader_url = format!("{}/{}", self.base_url, target.as_str());

        let mut content = self.request(&reader_url, true).await?;
        // Some sites don't use standard article/main containers
        if content.len() < MIN_CONTENT_LEN {
            tracing::debug!(
                url = %url,
                content_len = content.len(),
                "Target selector returned minimal content, retrying without selector"
            );
            content = self.request(&reader_url, false).await?;
        }

        let cleaned = strip_boilerplate(&content);
        if cleaned.trim().is_empty() {
            return Err(ContentError::Empty);
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl ContentExtractor for JinaExtractor {
    async fn extract(&self, cancel: &CancellationToken, url: &str) -> Result<String, ContentError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ContentError::Cancelled),
            result = self.extract_inner(url) => result,
        }
    }
}

/// Drop navigation and comment-form remnants the reader leaves behind.
fn strip_boilerplate(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("[Skip to content]")
                || trimmed == "Loading Comments..."
                || trimmed == "Write a Comment..."
                || trimmed.starts_with("Email (Required)")
                || trimmed == "Menu"
                || trimmed.contains("Proudly powered by WordPress"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}
