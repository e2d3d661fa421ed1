//! Concurrent RSS/Atom aggregation with bounded, rate-limited full-text
//! extraction.
//!
//! The pipeline per run:
//!
//! 1. [`SourceFetcher`] fetches every configured [`Source`] concurrently and
//!    normalizes entries into [`Item`]s with stable guids
//! 2. [`Aggregator`] merges the results, tolerating per-source failures
//! 3. [`ExtractionGate`] runs a [`ContentExtractor`] over every item under a
//!    concurrency bound and a global rate limit
//! 4. the resulting [`ExtractedItem`]s replace the published snapshot
//!
//! # Example
//!
//! ```ignore
//! let config = Arc::new(Config::load(path)?);
//! let fetcher = SourceFetcher::new(reqwest::Client::new(), config.fetch_timeout());
//! let aggregator = Aggregator::new(config, fetcher, None);
//!
//! if let Err(e) = aggregator.fetch_all(&CancellationToken::new()).await {
//!     tracing::warn!(error = %e, "Some sources failed");
//! }
//! let items = aggregator.items();
//! ```

pub mod aggregator;
pub mod config;
pub mod content;
pub mod feed;
pub mod types;
pub mod util;

pub use aggregator::{AggregateError, Aggregator, RunReport, RunState, SourceFailure};
pub use config::{Config, ConfigError, ConfigProvider, ExtractionConfig};
pub use content::{ContentError, ContentExtractor, ExtractionGate, JinaExtractor};
pub use feed::{FetchError, SourceFetcher};
pub use types::{ExtractedItem, Item, Source};
