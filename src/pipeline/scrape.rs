use crate::config::ScrapeConfig;
use crate::error::{CheckpointError, StoreError};
use crate::models::{ContractType, Property};
use crate::pipeline::checkpoint::{Checkpoint, ResumeKey, ResumeState};
use crate::scrapers::paginate::StopReason;
use crate::scrapers::{ListingSource, PageFetcher, Paginator, SearchParams};
use crate::storage::DelimitedFile;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use tracing::info;

/// `<output_dir>/<source>/<source>_<contract>.tsv`
pub fn listing_file(output_dir: &Path, source: &str, contract: ContractType) -> DelimitedFile {
    DelimitedFile::new(
        output_dir
            .join(source)
            .join(format!("{source}_{contract}.tsv")),
    )
}

/// Totals for one contract type
#[derive(Debug, Clone)]
pub struct ScrapeSummary {
    pub contract_type: ContractType,
    pub file: DelimitedFile,
    pub pages: usize,
    pub written: usize,
    pub skipped: usize,
    pub interrupted: bool,
}

/// Scrape one site into per-contract listing files, resuming from whatever
/// those files already hold.
pub struct ScrapeJob<'a> {
    source: &'a dyn ListingSource,
    fetcher: &'a dyn PageFetcher,
    config: &'a ScrapeConfig,
}

/// Append the records of a batch that are not in `state` yet.
/// Returns `(written, skipped)`.
pub fn write_new(
    file: &DelimitedFile,
    state: &mut ResumeState,
    records: Vec<Property>,
) -> Result<(usize, usize), StoreError> {
    let total = records.len();
    let mut seen = HashSet::new();
    let mut fresh = Vec::with_capacity(total);
    for record in records {
        let Some(key) = record.resume_key() else {
            continue;
        };
        if state.contains(&record) || !seen.insert(key.to_string()) {
            continue;
        }
        fresh.push(record);
    }
    file.append(&fresh)?;
    for record in &fresh {
        state.mark(record);
    }
    Ok((fresh.len(), total - fresh.len()))
}

impl<'a> ScrapeJob<'a> {
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

    /// Scrape every `(contract, property type)` pair. An empty `property_types`
    /// searches all types at once. Once `shutdown` resolves, the batch in
    /// flight is saved and no further search starts.
    pub async fn run<S>(
        &self,
        contracts: &[ContractType],
        property_types: &[String],
        restart: bool,
        shutdown: S,
    ) -> Result<Vec<ScrapeSummary>, CheckpointError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let kinds: Vec<Option<String>> = if property_types.is_empty() {
            vec![None]
        } else {
            property_types.iter().cloned().map(Some).collect()
        };

        let mut summaries = Vec::new();
        for &contract_type in contracts {
            let file = listing_file(&self.config.output_dir, self.source.source_name(), contract_type);
            let checkpoint = Checkpoint::new(vec![file.clone()], ResumeKey::Description);
            let mut state = if restart {
                checkpoint.restart()?;
                ResumeState::new(ResumeKey::Description)
            } else {
                checkpoint.resume_or_restart()?
            };

            let mut summary = ScrapeSummary {
                contract_type,
                file: file.clone(),
                pages: 0,
                written: 0,
                skipped: 0,
                interrupted: false,
            };

            for kind in &kinds {
                let params = SearchParams::new(contract_type, kind.clone());
                let paginator = Paginator::new(self.source, self.fetcher, self.config);
                let pages = paginator
                    .run(&params, shutdown.as_mut(), |report| {
                        let (written, skipped) = write_new(&file, &mut state, report.records)?;
                        summary.written += written;
                        summary.skipped += skipped;
                        info!(
                            batch = report.number,
                            pages = %format!("{}-{}", report.first_page, report.last_page),
                            written,
                            skipped,
                            path = %file.path().display(),
                            "💾 Saved batch"
                        );
                        Ok::<_, StoreError>(())
                    })
                    .await;
                info!(
                    search = %params.label(),
                    batches = pages.batches,
                    records = pages.records,
                    stop = ?pages.stop,
                    "Search finished"
                );
                summary.pages += pages.pages_requested;
                if pages.stop == StopReason::Interrupted {
                    summary.interrupted = true;
                    break;
                }
            }

            info!(
                source = self.source.source_name(),
                contract = %contract_type,
                written = summary.written,
                skipped = summary.skipped,
                "✅ Finished scraping"
            );
            let interrupted = summary.interrupted;
            summaries.push(summary);
            if interrupted {
                break;
            }
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::future::{pending, ready};

    /// Pages 1-2 have listings, then nothing
    struct TwoPages;

    #[async_trait]
    impl PageFetcher for TwoPages {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let page: usize = url.rsplit('=').next().unwrap().parse().unwrap();
            let contract = if url.contains("aluguel") { "aluguel" } else { "venda" };
            Ok(match page {
                1 => format!("{contract} a\n{contract} b"),
                2 => format!("{contract} b\n{contract} c"),
                _ => String::new(),
            })
        }
    }

    struct Lines;

    impl ListingSource for Lines {
        fn source_name(&self) -> &'static str {
            "lines"
        }

        fn page_url(&self, params: &SearchParams, page: usize) -> String {
            format!("https://example.test/{}?page={page}", params.contract_type)
        }

        fn parse_listings(&self, html: &str, params: &SearchParams) -> Vec<Property> {
            html.lines()
                .map(|l| Property {
                    description: l.to_string(),
                    contract_type: params.contract_type,
                    ..Default::default()
                })
                .collect()
        }

        fn property_types(&self) -> &'static [&'static str] {
            &[]
        }
    }

    fn config(dir: &Path) -> ScrapeConfig {
        ScrapeConfig {
            workers: 2,
            batch_size: 2,
            batch_delay_secs: 0.0,
            batch_delay_jitter_secs: 0.0,
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn writes_one_file_per_contract_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let job = ScrapeJob::new(&Lines, &TwoPages, &cfg);

        let first = job.run(&ContractType::ALL, &[], false, pending()).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].written, 3);
        assert_eq!(first[0].skipped, 1);

        let rentals = listing_file(dir.path(), "lines", ContractType::Aluguel)
            .read_all()
            .unwrap();
        let descriptions: Vec<_> = rentals.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descriptions, vec!["aluguel a", "aluguel b", "aluguel c"]);

        let second = job.run(&[ContractType::Venda], &[], false, pending()).await.unwrap();
        assert_eq!(second[0].written, 0);
        assert_eq!(second[0].skipped, 4);

        let restarted = job.run(&[ContractType::Venda], &[], true, pending()).await.unwrap();
        assert_eq!(restarted[0].written, 3);
    }

    #[test]
    fn failed_append_leaves_records_unmarked() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the output directory should be
        std::fs::write(dir.path().join("blocked"), "").unwrap();
        let broken = DelimitedFile::new(dir.path().join("blocked/out.tsv"));
        let mut state = ResumeState::new(ResumeKey::Description);
        let batch = vec![
            Property {
                description: "Casa no Guará".into(),
                ..Default::default()
            };
            2
        ];

        assert!(write_new(&broken, &mut state, batch.clone()).is_err());
        assert!(state.is_empty());

        let file = DelimitedFile::new(dir.path().join("out.tsv"));
        assert_eq!(write_new(&file, &mut state, batch).unwrap(), (1, 1));
        assert_eq!(file.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_after_the_current_search() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let job = ScrapeJob::new(&Lines, &TwoPages, &cfg);

        let summaries = job
            .run(&ContractType::ALL, &[], false, ready(()))
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].interrupted);
        assert!(!listing_file(dir.path(), "lines", ContractType::Aluguel)
            .path()
            .exists());
    }
}
