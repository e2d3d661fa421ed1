use super::{ContentError, ContentExtractor};
use crate::types::{ExtractedItem, Item};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Concurrency and rate envelope around a [`ContentExtractor`].
///
/// Each attempt first takes a slot from a fixed-size admission pool, then
/// waits on a pacer shared by every caller, then calls the extractor. The
/// pacer spaces successive calls at least `rate_limit` apart across all
/// sources combined; it is not per host.
pub struct ExtractionGate {
    extractor: Arc<dyn ContentExtractor>,
    slots: Semaphore,
    max_concurrent: usize,
    rate_limit: Duration,
    /// When the pacer last let a call through
    last_release: Mutex<Option<Instant>>,
}

impl ExtractionGate {
    /// `max_concurrent` is clamped to at least 1.
    pub fn new(
        extractor: Arc<dyn ContentExtractor>,
        max_concurrent: usize,
        rate_limit: Duration,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            extractor,
            slots: Semaphore::new(max_concurrent),
            max_concurrent,
            rate_limit,
            last_release: Mutex::new(None),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    /// Run one gated extraction.
    ///
    /// Blocks for a free slot and the next pacer release. The slot is held
    /// until the extractor returns.
    pub async fn extract(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<String, ContentError> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ContentError::Cancelled),
            permit = self.slots.acquire() => permit.map_err(|_| ContentError::Cancelled)?,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ContentError::Cancelled),
            _ = self.wait_turn() => {}
        }

        self.extractor.extract(cancel, url).await
    }

    /// Extract `item`'s article. Never fails: any error yields an
    /// [`ExtractedItem`] with `content_extracted == false`.
    pub async fn extract_item(&self, cancel: &CancellationToken, item: Item) -> ExtractedItem {
        if item.link.is_empty() {
            tracing::debug!(guid = %item.guid, "Item has no link, skipping extraction");
            return ExtractedItem::skipped(item);
        }

        match self.extract(cancel, &item.link).await {
            Ok(text) => ExtractedItem::extracted(item, text),
            Err(ContentError::Cancelled) => {
                tracing::debug!(url = %item.link, "Extraction cancelled");
                ExtractedItem::skipped(item)
            }
            Err(e) => {
                tracing::warn!(url = %item.link, source = %item.source, error = %e, "Content extraction failed");
                ExtractedItem::skipped(item)
            }
        }
    }

    /// Wait until at least `rate_limit` has passed since the previous release.
    ///
    /// The lock is held across the sleep so waiters are released one at a
    /// time in arrival order.
    async fn wait_turn(&self) {
        let mut last = self.last_release.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.rate_limit).await;
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Records call times and the peak number of concurrent calls.
    #[derive(Default)]
    struct CountingExtractor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: StdMutex<Vec<Instant>>,
        work: Duration,
        fail: bool,
    }

    #[async_trait]
    impl ContentExtractor for CountingExtractor {
        async fn extract(
            &self,
            _cancel: &CancellationToken,
            url: &str,
        ) -> Result<String, ContentError> {
            self.calls.lock().unwrap().push(Instant::now());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(ContentError::HttpStatus(500))
            } else {
                Ok(format!("text of {url}"))
            }
        }
    }

    fn item(n: usize) -> Item {
        Item {
            source: "test".into(),
            guid: format!("g{n}"),
            title: format!("Item {n}"),
            link: format!("https://example.com/{n}"),
            description: String::new(),
            content: None,
            author: String::new(),
            published: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_limit() {
        let stub = Arc::new(CountingExtractor {
            work: Duration::from_millis(100),
            ..Default::default()
        });
        let gate = ExtractionGate::new(stub.clone(), 3, Duration::ZERO);
        let cancel = CancellationToken::new();

        let results =
            futures::future::join_all((0..10).map(|n| gate.extract_item(&cancel, item(n)))).await;

        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|r| r.content_extracted));
        assert_eq!(stub.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_spaced_by_rate_limit() {
        let stub = Arc::new(CountingExtractor::default());
        let gate = ExtractionGate::new(stub.clone(), 10, Duration::from_millis(50));
        let cancel = CancellationToken::new();

        futures::future::join_all((0..3).map(|n| gate.extract_item(&cancel, item(n)))).await;

        let calls = stub.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_failure_becomes_soft_flag() {
        let stub = Arc::new(CountingExtractor {
            fail: true,
            ..Default::default()
        });
        let gate = ExtractionGate::new(stub.clone(), 2, Duration::ZERO);

        let result = gate.extract_item(&CancellationToken::new(), item(1)).await;
        assert!(!result.content_extracted);
        assert!(result.extracted_content.is_empty());
        assert_eq!(result.item, item(1));
    }

    #[tokio::test]
    async fn test_item_without_link_skips_extractor() {
        let stub = Arc::new(CountingExtractor::default());
        let gate = ExtractionGate::new(stub.clone(), 2, Duration::ZERO);
        let mut linkless = item(1);
        linkless.link.clear();

        let result = gate.extract_item(&CancellationToken::new(), linkless).await;
        assert!(!result.content_extracted);
        assert!(stub.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_slot() {
        let stub = Arc::new(CountingExtractor::default());
        let gate = ExtractionGate::new(stub.clone(), 1, Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = gate.extract(&cancel, "https://example.com/1").await;
        assert!(matches!(result, Err(ContentError::Cancelled)));
        assert!(stub.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let gate = ExtractionGate::new(
            Arc::new(CountingExtractor::default()),
            0,
            Duration::from_millis(10),
        );
        assert_eq!(gate.max_concurrent(), 1);
        assert_eq!(gate.rate_limit(), Duration::from_millis(10));
    }
}
