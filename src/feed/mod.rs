//! Fetching and parsing of individual RSS/Atom sources.
//!
//! - [`parser`] - feed parsing via `feed-rs` and identity assignment
//! - [`fetcher`] - HTTP retrieval with timeout, cancellation and varied headers

mod fetcher;
mod parser;

pub use fetcher::{FetchError, SourceFetcher};
pub use parser::{parse_items, ParseError};
