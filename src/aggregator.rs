//! Run orchestration: concurrent fetch of every source, merge under
//! partial failure, gated extraction, and publication of one snapshot.
//!
//! A run moves `Idle → Fetching → Extracting → Idle`. Only one run may be in
//! progress per [`Aggregator`]; an overlapping call to
//! [`Aggregator::fetch_all`] is rejected with [`AggregateError::Busy`] and
//! leaves the published snapshot untouched.
use crate::config::ConfigProvider;
use crate::content::{ContentExtractor, ExtractionGate};
use crate::feed::{FetchError, SourceFetcher};
use crate::types::{ExtractedItem, Item, Source};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum AggregateError {
    /// The first source failure of the run, in completion order. Items from
    /// every other source were still merged and published.
    #[error("Source '{name}' failed: {error}")]
    Source {
        name: String,
        #[source]
        error: FetchError,
    },
    #[error("An aggregation run is already in progress")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Extracting,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Fetching,
            2 => RunState::Extracting,
            _ => RunState::Idle,
        }
    }
}

/// One source that failed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub name: String,
    pub url: String,
    pub error: String,
}

/// Summary of the most recent completed run.
///
/// Unlike the error returned by `fetch_all`, this keeps every failure.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: usize,
    pub failures: Vec<SourceFailure>,
    pub items: usize,
    pub extracted: usize,
}

pub struct Aggregator {
    config: Arc<dyn ConfigProvider>,
    fetcher: SourceFetcher,
    extractor: Option<Arc<dyn ContentExtractor>>,
    snapshot: Mutex<Vec<ExtractedItem>>,
    report: Mutex<Option<RunReport>>,
    running: AtomicBool,
    state: AtomicU8,
}

/// Clears the in-progress flag even if the run future is dropped midway.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    state: &'a AtomicU8,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool, state: &'a AtomicU8) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running, state })
    }

    fn enter(&self, state: RunState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.store(RunState::Idle as u8, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }
}

impl Aggregator {
    /// `extractor` may be `None`, in which case extraction is skipped even
    /// when the config enables it.
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        fetcher: SourceFetcher,
        extractor: Option<Arc<dyn ContentExtractor>>,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
            snapshot: Mutex::new(Vec::new()),
            report: Mutex::new(None),
            running: AtomicBool::new(false),
            state: AtomicU8::new(RunState::Idle as u8),
        }
    }

    /// Run one full aggregation cycle.
    ///
    /// Every configured source is fetched concurrently. Items from the
    /// sources that succeeded are merged (in completion order), extracted if
    /// enabled, and published as the new snapshot, even when some sources
    /// failed.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::Source`] - the first source failure; the snapshot
    ///   was still replaced with whatever succeeded
    /// - [`AggregateError::Busy`] - another run is in progress; nothing changed
    pub async fn fetch_all(&self, cancel: &CancellationToken) -> Result<(), AggregateError> {
        let guard = RunGuard::acquire(&self.running, &self.state).ok_or_else(|| {
            tracing::warn!("Aggregation run requested while another is in progress");
            AggregateError::Busy
        })?;
        let started_at = Utc::now();
        let sources = self.config.sources();
        let source_count = sources.len();

        guard.enter(RunState::Fetching);
        let (items, mut failures) = self.fetch_sources(cancel, sources).await;

        guard.enter(RunState::Extracting);
        let extracted = self.extract_items(cancel, items).await;

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            sources: source_count,
            failures: failures
                .iter()
                .map(|(source, error)| SourceFailure {
                    name: source.name.clone(),
                    url: source.url.clone(),
                    error: error.to_string(),
                })
                .collect(),
            items: extracted.len(),
            extracted: extracted.iter().filter(|i| i.content_extracted).count(),
        };
        tracing::info!(
            sources = report.sources,
            failed = report.failures.len(),
            items = report.items,
            extracted = report.extracted,
            "Aggregation run complete"
        );

        self.publish(extracted);
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);

        if failures.is_empty() {
            Ok(())
        } else {
            let (source, error) = failures.swap_remove(0);
            Err(AggregateError::Source {
                name: source.name,
                error,
            })
        }
    }

    /// A copy of the current snapshot. Empty until the first run completes.
    pub fn items(&self) -> Vec<ExtractedItem> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_sources(
        &self,
        cancel: &CancellationToken,
        sources: Vec<Source>,
    ) -> (Vec<Item>, Vec<(Source, FetchError)>) {
        if sources.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let limit = match self.config.fetch_concurrency() {
            0 => sources.len(),
            n => n,
        };

        let outcomes: Vec<(Source, Result<Vec<Item>, FetchError>)> = stream::iter(sources)
            .map(|source| async move {
                let result = self.fetcher.fetch(cancel, &source.url, &source.name).await;
                (source, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for (source, result) in outcomes {
            match result {
                Ok(fetched) => items.extend(fetched),
                Err(error) => failures.push((source, error)),
            }
        }
        (items, failures)
    }

    async fn extract_items(&self, cancel: &CancellationToken, items: Vec<Item>) -> Vec<ExtractedItem> {
        let settings = self.config.extraction();
        let extractor = match &self.extractor {
            Some(extractor) if settings.enabled => Arc::clone(extractor),
            _ => {
                tracing::debug!(items = items.len(), "Extraction disabled, skipping");
                return items.into_iter().map(ExtractedItem::skipped).collect();
            }
        };
        if items.is_empty() {
            return Vec::new();
        }

        let gate = ExtractionGate::new(extractor, settings.max_concurrent, settings.rate_limit);
        let in_flight = items.len();
        stream::iter(items)
            .map(|item| gate.extract_item(cancel, item))
            .buffer_unordered(in_flight)
            .collect()
            .await
    }

    fn publish(&self, items: Vec<ExtractedItem>) {
        let previous = {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *snapshot, items)
        };
        // Old snapshot is freed outside the lock
        drop(previous);
    }
}
