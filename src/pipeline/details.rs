use crate::error::JobError;
use crate::models::Property;
use crate::pipeline::checkpoint::{Checkpoint, ResumeKey, ResumeState};
use crate::pipeline::merge::DETAILED_DIR;
use crate::scrapers::{ListingSource, PageFetcher};
use crate::storage::DelimitedFile;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::path::Path;
use std::pin::pin;
use tracing::{info, warn};

/// `<dir>/detailed_properties/<name>` for a listing file in `<dir>`
pub fn detailed_file(listing: &Path) -> DelimitedFile {
    let parent = listing.parent().unwrap_or_else(|| Path::new(""));
    let name = listing
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "listings.tsv".into());
    DelimitedFile::new(parent.join(DETAILED_DIR).join(name))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DetailSummary {
    pub pending: usize,
    pub enriched: usize,
    pub missing: usize,
    /// Listings without a link, written through unchanged
    pub unlinked: usize,
    pub skipped: usize,
    pub interrupted: bool,
}

/// What happened to one listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detail {
    Enriched,
    Missing,
    NoLink,
}

/// Replaces card descriptions with the long text from each listing's detail page.
pub struct DetailJob<'a> {
    source: &'a dyn ListingSource,
    fetcher: &'a dyn PageFetcher,
    workers: usize,
    batch_size: usize,
}

impl<'a> DetailJob<'a> {
    pub fn new(
        source: &'a dyn ListingSource,
        fetcher: &'a dyn PageFetcher,
        workers: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            fetcher,
            workers: workers.max(1),
            batch_size: batch_size.max(1),
        }
    }

    async fn enrich(&self, mut record: Property) -> (Property, Detail) {
        let Some(link) = record.link.clone().filter(|l| !l.trim().is_empty()) else {
            return (record, Detail::NoLink);
        };
        match self.fetcher.fetch(&link).await {
            Ok(html) => match self.source.parse_detail_description(&html) {
                Some(description) => {
                    record.description = description;
                    (record, Detail::Enriched)
                }
                None => {
                    warn!(link, "No description on detail page");
                    (record, Detail::Missing)
                }
            },
            Err(e) => {
                warn!(link, error = %e, "Failed to fetch detail page");
                (record, Detail::Missing)
            }
        }
    }

    /// Copy every record of `input` not in `output` yet, replacing the
    /// description of those with a link, one batch at a time. Listings without
    /// a link pass through unchanged. Once `shutdown` resolves, the records
    /// finished so far are saved and the run ends.
    pub async fn run<S>(
        &self,
        input: &DelimitedFile,
        output: &DelimitedFile,
        restart: bool,
        shutdown: S,
    ) -> Result<DetailSummary, JobError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let checkpoint = Checkpoint::new(vec![output.clone()], ResumeKey::Link);
        let state = if restart {
            checkpoint.restart()?;
            ResumeState::new(ResumeKey::Link)
        } else {
            checkpoint.resume_or_restart()?
        };

        let records: Vec<Property> = input
            .read_all()?
            .into_iter()
            .filter(|r| ResumeKey::Link.of(r).is_some())
            .collect();
        let (pending, skipped) = state.pending(records);

        let mut summary = DetailSummary {
            pending: pending.len(),
            skipped,
            ..Default::default()
        };
        info!(
            input = %input.path().display(),
            pending = summary.pending,
            skipped,
            "Fetching detail pages"
        );

        for (number, chunk) in pending.chunks(self.batch_size).enumerate() {
            let mut details = pin!(stream::iter(chunk.iter().cloned())
                .map(|record| self.enrich(record))
                .buffered(self.workers));
            let mut results: Vec<(Property, Detail)> = Vec::with_capacity(chunk.len());
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        summary.interrupted = true;
                        while let Some(Some(result)) = details.next().now_or_never() {
                            results.push(result);
                        }
                        break;
                    }
                    next = details.next() => match next {
                        Some(result) => results.push(result),
                        None => break,
                    },
                }
            }

            let count = |kind: Detail| results.iter().filter(|(_, d)| *d == kind).count();
            let enriched = count(Detail::Enriched);
            summary.enriched += enriched;
            summary.missing += count(Detail::Missing);
            summary.unlinked += count(Detail::NoLink);

            let batch: Vec<Property> = results.into_iter().map(|(r, _)| r).collect();
            output.append(&batch)?;
            info!(
                batch = number + 1,
                saved = batch.len(),
                enriched,
                total = summary.enriched,
                "💾 Saved detail batch"
            );

            if summary.interrupted {
                warn!(batch = number + 1, "Shutdown requested, stopping after partial batch");
                break;
            }
        }

        Ok(summary)
    }
}
