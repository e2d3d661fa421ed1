//! Full-text content extraction.
//!
//! [`ContentExtractor`] is the pluggable capability: given an article URL it
//! returns best-effort article text. [`JinaExtractor`] is the bundled
//! implementation. [`ExtractionGate`] wraps any extractor with a concurrency
//! bound and a global minimum spacing between calls.

mod gate;
mod jina;

pub use gate::ExtractionGate;
pub use jina::JinaExtractor;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out")]
    Timeout,
    #[error("Extraction cancelled")]
    Cancelled,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] crate::util::UrlValidationError),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Extractor returned no content")]
    Empty,
}

/// Turns an article URL into readable text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extract the article at `url`. Implementations should stop early when
    /// `cancel` fires.
    async fn extract(&self, cancel: &CancellationToken, url: &str) -> Result<String, ContentError>;
}
