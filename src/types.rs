//! Shared data types flowing through the aggregation pipeline.
//!
//! A [`Source`] is configuration; an [`Item`] is one normalized feed entry as
//! fetched; an [`ExtractedItem`] pairs an item with the outcome of full-text
//! extraction. Items are rebuilt on every run and never persisted here.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Source
// ============================================================================

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    pub url: String,
    pub name: String,
    /// Desired fetch interval. Deserialized from `interval_minutes`.
    #[serde(
        rename = "interval_minutes",
        default = "default_interval",
        deserialize_with = "minutes"
    )]
    pub interval: Duration,
}

fn default_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

fn minutes<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let mins = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(mins.saturating_mul(60)))
}

impl Source {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            interval: default_interval(),
        }
    }
}

// ============================================================================
// Item
// ============================================================================

/// A single feed entry, normalized from RSS or Atom.
///
/// `guid` is stable across repeated fetches of the same logical entry; see
/// [`crate::feed::parse_items`] for the assignment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    /// Configured name of the source this entry came from
    pub source: String,
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    /// Full content when the feed inlines it
    pub content: Option<String>,
    pub author: String,
    /// Published time, falling back to the updated time. `None` when the feed gives neither.
    pub published: Option<DateTime<Utc>>,
}

// ============================================================================
// ExtractedItem
// ============================================================================

/// An [`Item`] plus the result of full-text extraction.
///
/// Built once by the extraction stage and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedItem {
    #[serde(flatten)]
    pub item: Item,
    /// Extracted article text; empty when extraction failed or was skipped
    pub extracted_content: String,
    pub content_extracted: bool,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedItem {
    /// Successful extraction.
    pub fn extracted(item: Item, text: String) -> Self {
        Self {
            item,
            extracted_content: text,
            content_extracted: true,
            extracted_at: Utc::now(),
        }
    }

    /// Extraction disabled, failed, or not attempted.
    pub fn skipped(item: Item) -> Self {
        Self {
            item,
            extracted_content: String::new(),
            content_extracted: false,
            extracted_at: Utc::now(),
        }
    }

    pub fn guid(&self) -> &str {
        &self.item.guid
    }
}
