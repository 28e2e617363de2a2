//! Batched pagination over a listing site.
//!
//! Pages are requested in batches of `batch_size`, at most `workers` at a
//! time. Outcomes are evaluated in page order so that the consecutive-empty
//! rule is deterministic regardless of which request finishes first.

use crate::config::ScrapeConfig;
use crate::error::FetchError;
use crate::models::Property;
use crate::scrapers::fetch::PageFetcher;
use crate::scrapers::traits::ListingSource;
use crate::scrapers::types::SearchParams;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::pin::pin;
use tracing::{info, warn};

/// Result of requesting one results page
#[derive(Debug)]
pub enum PageOutcome {
    Listings(Vec<Property>),
    Empty,
    Failed(FetchError),
}

/// Counts consecutive empty pages and says when to stop.
///
/// Failed pages neither extend nor reset the run.
#[derive(Debug, Clone)]
pub struct EmptyPageTracker {
    threshold: usize,
    consecutive: usize,
}

impl EmptyPageTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Record an outcome; returns `true` once the threshold is reached.
    pub fn observe(&mut self, outcome: &PageOutcome) -> bool {
        match outcome {
            PageOutcome::Listings(_) => self.consecutive = 0,
            PageOutcome::Empty => self.consecutive += 1,
            PageOutcome::Failed(_) => {}
        }
        self.consecutive >= self.threshold
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }
}

/// One flushed batch
#[derive(Debug)]
pub struct BatchReport {
    pub number: usize,
    pub first_page: usize,
    pub last_page: usize,
    pub records: Vec<Property>,
    pub empty_pages: usize,
    pub failed_pages: usize,
}

/// Why pagination ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPages,
    MaxPages,
    Interrupted,
}

#[derive(Debug)]
pub struct PaginationSummary {
    pub pages_requested: usize,
    pub batches: usize,
    pub records: usize,
    pub stop: StopReason,
}

pub struct Paginator<'a> {
    source: &'a dyn ListingSource,
    fetcher: &'a dyn PageFetcher,
    config: &'a ScrapeConfig,
}

impl<'a> Paginator<'a> {
    pub fn new(
        source: &'a dyn ListingSource,
        fetcher: &'a dyn PageFetcher,
        config: &'a ScrapeConfig,
    ) -> Self {
        Self {
            source,
            fetcher,
            config,
        }
    }

    async fn fetch_page(&self, params: &SearchParams, page: usize) -> PageOutcome {
        let url = self.source.page_url(params, page);
        match self.fetcher.fetch(&url).await {
            Ok(html) => {
                let listings = self.source.parse_listings(&html, params);
                if listings.is_empty() {
                    PageOutcome::Empty
                } else {
                    PageOutcome::Listings(listings)
                }
            }
            Err(e) => PageOutcome::Failed(e),
        }
    }

    /// Page through results, handing every completed batch to `on_batch`.
    ///
    /// A failing `on_batch` is logged and the run continues. When `shutdown`
    /// resolves, pages already fetched in the current batch are handed over
    /// as a final partial batch and the run ends.
    pub async fn run<S, F, E>(
        &self,
        params: &SearchParams,
        shutdown: S,
        mut on_batch: F,
    ) -> PaginationSummary
    where
        S: Future<Output = ()>,
        F: FnMut(BatchReport) -> Result<(), E>,
        E: std::fmt::Display,
    {
        tokio::pin!(shutdown);
        let batch_size = self.config.batch_size.max(1);
        let workers = self.config.workers.max(1);
        let mut tracker = EmptyPageTracker::new(self.config.empty_page_threshold);

        let mut next_page = 1;
        let mut batches = 0;
        let mut total_records = 0;
        let mut stop = StopReason::MaxPages;

        loop {
            let mut last_page = next_page + batch_size - 1;
            if let Some(max) = self.config.max_pages {
                last_page = last_page.min(max);
            }
            if next_page > last_page {
                break;
            }
            let number = batches + 1;

            info!(
                source = self.source.source_name(),
                search = %params.label(),
                batch = number,
                "--- Starting batch (pages {next_page} to {last_page}) ---"
            );

            let mut pages = pin!(stream::iter(next_page..=last_page)
                .map(|page| async move { (page, self.fetch_page(params, page).await) })
                .buffered(workers));
            let mut outcomes: Vec<(usize, PageOutcome)> = Vec::new();
            let mut interrupted = false;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        interrupted = true;
                        // keep pages that finished but were not yielded yet
                        while let Some(Some(outcome)) = pages.next().now_or_never() {
                            outcomes.push(outcome);
                        }
                        break;
                    }
                    next = pages.next() => match next {
                        Some(outcome) => outcomes.push(outcome),
                        None => break,
                    },
                }
            }

            let mut report = BatchReport {
                number,
                first_page: next_page,
                last_page: if interrupted {
                    outcomes.last().map_or(next_page - 1, |(page, _)| *page)
                } else {
                    last_page
                },
                records: Vec::new(),
                empty_pages: 0,
                failed_pages: 0,
            };
            let mut halted = false;

            for (page, outcome) in outcomes {
                let done = tracker.observe(&outcome);
                match outcome {
                    PageOutcome::Listings(mut listings) => {
                        info!(page, found = listings.len(), "Page scraped");
                        report.records.append(&mut listings);
                    }
                    PageOutcome::Empty => {
                        info!(page, "Page has no listings");
                        report.empty_pages += 1;
                    }
                    PageOutcome::Failed(e) => {
                        warn!(page, status = ?e.status(), error = %e, "Failed to fetch page");
                        report.failed_pages += 1;
                    }
                }
                if done {
                    info!(
                        page,
                        empty = tracker.consecutive(),
                        "Consecutive empty pages reached, assuming end of results"
                    );
                    report.last_page = page;
                    halted = true;
                    break;
                }
            }

            next_page = report.last_page + 1;
            batches = number;
            total_records += report.records.len();

            info!(
                batch = report.number,
                first_page = report.first_page,
                last_page = report.last_page,
                found = report.records.len(),
                empty = report.empty_pages,
                failed = report.failed_pages,
                total = total_records,
                "--- Batch completed ---"
            );

            if let Err(e) = on_batch(report) {
                warn!(batch = number, error = %e, "Failed to save batch");
            }

            if halted {
                stop = StopReason::EmptyPages;
                break;
            }
            if interrupted {
                warn!(batch = number, "Shutdown requested, stopping after partial batch");
                stop = StopReason::Interrupted;
                break;
            }
            if self.config.max_pages.is_some_and(|max| next_page > max) {
                info!("Reached the maximum number of pages");
                break;
            }

            let delay = self.config.batch_delay();
            if !delay.is_zero() {
                info!(secs = delay.as_secs_f64(), "Pausing before next batch");
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        warn!("Shutdown requested between batches");
                        stop = StopReason::Interrupted;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        PaginationSummary {
            pages_requested: next_page - 1,
            batches,
            records: total_records,
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContractType;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::future::pending;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves `page=N` bodies from a map; anything missing is an empty page
    struct FakeFetcher {
        pages: HashMap<usize, Result<String, u16>>,
        requested: Mutex<Vec<usize>>,
    }

    impl FakeFetcher {
        fn new(pages: Vec<(usize, Result<&str, u16>)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(p, body)| (p, body.map(str::to_string)))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let page: usize = url.rsplit('=').next().unwrap().parse().unwrap();
            self.requested.lock().unwrap().push(page);
            match self.pages.get(&page) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Ok(String::new()),
            }
        }
    }

    /// One listing per non-empty line
    struct LineSource;

    impl ListingSource for LineSource {
        fn source_name(&self) -> &'static str {
            "lines"
        }

        fn page_url(&self, _params: &SearchParams, page: usize) -> String {
            format!("https://example.test/?page={page}")
        }

        fn parse_listings(&self, html: &str, params: &SearchParams) -> Vec<Property> {
            html.lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| Property {
                    description: l.trim().to_string(),
                    contract_type: params.contract_type,
                    ..Default::default()
                })
                .collect()
        }

        fn property_types(&self) -> &'static [&'static str] {
            &[]
        }
    }

    fn config(batch_size: usize, threshold: usize, max_pages: Option<usize>) -> ScrapeConfig {
        ScrapeConfig {
            workers: 2,
            batch_size,
            batch_delay_secs: 0.0,
            batch_delay_jitter_secs: 0.0,
            empty_page_threshold: threshold,
            max_pages,
            ..Default::default()
        }
    }

    #[test]
    fn tracker_halts_exactly_at_threshold() {
        let mut tracker = EmptyPageTracker::new(3);
        assert!(!tracker.observe(&PageOutcome::Empty));
        assert!(!tracker.observe(&PageOutcome::Empty));
        assert!(tracker.observe(&PageOutcome::Empty));
    }

    #[test]
    fn listings_reset_the_run_and_failures_do_not() {
        let mut tracker = EmptyPageTracker::new(2);
        assert!(!tracker.observe(&PageOutcome::Empty));
        assert!(!tracker.observe(&PageOutcome::Listings(vec![Property::default()])));
        assert_eq!(tracker.consecutive(), 0);
        assert!(!tracker.observe(&PageOutcome::Empty));
        let failure = PageOutcome::Failed(FetchError::Status {
            url: "u".into(),
            status: 503,
        });
        assert!(!tracker.observe(&failure));
        assert_eq!(tracker.consecutive(), 1);
        assert!(tracker.observe(&PageOutcome::Empty));
    }

    #[tokio::test]
    async fn stops_after_consecutive_empty_pages() {
        // page 2 is an isolated empty page; 4 and 5 end the results
        let fetcher = FakeFetcher::new(vec![
            (1, Ok("a\nb")),
            (3, Ok("c")),
            (6, Ok("never reached")),
        ]);
        let cfg = config(3, 2, None);
        let paginator = Paginator::new(&LineSource, &fetcher, &cfg);
        let params = SearchParams::new(ContractType::Venda, None);

        let mut batches = Vec::new();
        let summary = paginator
            .run(&params, pending(), |report| {
                batches.push(report);
                Ok::<_, String>(())
            })
            .await;

        assert_eq!(summary.stop, StopReason::EmptyPages);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.pages_requested, 5);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].last_page, 5);
        let descriptions: Vec<_> = batches
            .iter()
            .flat_map(|b| b.records.iter().map(|r| r.description.clone()))
            .collect();
        assert_eq!(descriptions, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failed_pages_do_not_end_pagination() {
        let fetcher = FakeFetcher::new(vec![
            (1, Ok("a")),
            (2, Err(503)),
            (3, Err(500)),
            (4, Ok("b")),
        ]);
        let cfg = config(2, 2, Some(4));
        let paginator = Paginator::new(&LineSource, &fetcher, &cfg);
        let params = SearchParams::default();

        let mut failed = 0;
        let summary = paginator
            .run(&params, pending(), |report| {
                failed += report.failed_pages;
                Ok::<_, String>(())
            })
            .await;

        assert_eq!(summary.stop, StopReason::MaxPages);
        assert_eq!(summary.records, 2);
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn max_pages_caps_requests() {
        let pages: Vec<(usize, Result<&str, u16>)> = (1..=10).map(|p| (p, Ok("x"))).collect();
        let fetcher = FakeFetcher::new(pages);
        let cfg = config(4, 2, Some(6));
        let paginator = Paginator::new(&LineSource, &fetcher, &cfg);

        let summary = paginator
            .run(&SearchParams::default(), pending(), |_| Ok::<_, String>(()))
            .await;

        let mut requested = fetcher.requested.lock().unwrap().clone();
        requested.sort_unstable();
        assert_eq!(requested, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(summary.pages_requested, 6);
        assert_eq!(summary.batches, 2);
    }

    /// Every page has one listing; page `hang_at` never answers
    struct SlowPage {
        hang_at: usize,
        started: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for SlowPage {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let page: usize = url.rsplit('=').next().unwrap().parse().unwrap();
            self.started.fetch_add(1, Ordering::SeqCst);
            if page == self.hang_at {
                pending::<()>().await;
            }
            Ok(format!("listing {page}"))
        }
    }

    #[tokio::test]
    async fn shutdown_flushes_pages_already_fetched() {
        let fetcher = SlowPage {
            hang_at: 6,
            started: AtomicUsize::new(0),
        };
        let cfg = config(3, 2, None);
        let paginator = Paginator::new(&LineSource, &fetcher, &cfg);
        let shutdown = async {
            while fetcher.started.load(Ordering::SeqCst) < 5 {
                tokio::task::yield_now().await;
            }
        };

        let mut batches = Vec::new();
        let summary = paginator
            .run(&SearchParams::default(), shutdown, |report| {
                batches.push(report);
                Ok::<_, String>(())
            })
            .await;

        assert_eq!(summary.stop, StopReason::Interrupted);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.records, 5);
        assert_eq!(summary.pages_requested, 5);
        let partial = &batches[1];
        assert_eq!((partial.first_page, partial.last_page), (4, 5));
        let descriptions: Vec<_> = partial.records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descriptions, vec!["listing 4", "listing 5"]);
    }
}
