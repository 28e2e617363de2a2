//! Final processing: clean, normalize, geocode and split merged listings
//! into one CSV per contract type.
//!
//! Rows are appended after every geocoding batch, so the job can be stopped
//! at any point and resumed later without geocoding the same listing twice.

use crate::error::{JobError, StoreError};
use crate::geocode::GeocodeChain;
use crate::models::{ContractType, Property};
use crate::pipeline::checkpoint::{Checkpoint, ResumeKey, ResumeState};
use crate::pipeline::cleaner::{CleanReport, DataCleaner};
use crate::pipeline::transform::DataTransformer;
use crate::storage::DelimitedFile;
use std::fs;
use std::future::Future;
use std::path::Path;
use tracing::{info, warn};

pub const RENTAL_FILE: &str = "imoveis_aluguel_final.csv";
pub const SALES_FILE: &str = "imoveis_venda_final.csv";

/// The two final CSV files
#[derive(Debug, Clone)]
pub struct FinalOutputs {
    pub rental: DelimitedFile,
    pub sales: DelimitedFile,
}

/// Row counts of one output file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub contract_type: ContractType,
    pub path: String,
    pub rows: usize,
    pub with_coordinates: usize,
    pub bytes: u64,
}

impl FileReport {
    pub fn coordinate_share(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.with_coordinates as f64 * 100.0 / self.rows as f64
        }
    }
}

impl FinalOutputs {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            rental: DelimitedFile::new(dir.join(RENTAL_FILE)),
            sales: DelimitedFile::new(dir.join(SALES_FILE)),
        }
    }

    pub fn for_contract(&self, contract_type: ContractType) -> &DelimitedFile {
        match contract_type {
            ContractType::Aluguel => &self.rental,
            ContractType::Venda => &self.sales,
        }
    }

    fn files(&self) -> Vec<DelimitedFile> {
        vec![self.rental.clone(), self.sales.clone()]
    }

    /// Append records to the file of their contract type
    pub fn append(&self, records: &[Property]) -> Result<usize, StoreError> {
        let mut written = 0;
        for contract_type in ContractType::ALL {
            let rows: Vec<Property> = records
                .iter()
                .filter(|r| r.contract_type == contract_type)
                .cloned()
                .collect();
            if !rows.is_empty() {
                written += self.for_contract(contract_type).append(&rows)?;
            }
        }
        Ok(written)
    }

    /// Current contents of both files
    pub fn report(&self) -> Result<Vec<FileReport>, StoreError> {
        ContractType::ALL
            .iter()
            .map(|&contract_type| {
                let file = self.for_contract(contract_type);
                let records = file.read_all()?;
                Ok(FileReport {
                    contract_type,
                    path: file.path().display().to_string(),
                    rows: records.len(),
                    with_coordinates: records.iter().filter(|r| r.coordinates().is_some()).count(),
                    bytes: fs::metadata(file.path()).map(|m| m.len()).unwrap_or(0),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    /// Records geocoded between flushes
    pub batch_size: usize,
    pub skip_geocoding: bool,
    /// Ignore previous output and start over
    pub restart: bool,
}

#[derive(Debug, Default)]
pub struct ProcessSummary {
    pub cleaning: CleanReport,
    pub resumed: usize,
    pub written: usize,
    pub geocoded: usize,
    pub interrupted: bool,
}

pub struct ProcessJob<'a> {
    outputs: FinalOutputs,
    options: ProcessOptions,
    geocoder: Option<&'a mut GeocodeChain>,
}

impl<'a> ProcessJob<'a> {
    pub fn new(
        outputs: FinalOutputs,
        options: ProcessOptions,
        geocoder: Option<&'a mut GeocodeChain>,
    ) -> Self {
        Self {
            outputs,
            options,
            geocoder,
        }
    }

    fn resume_state(&self) -> Result<ResumeState, JobError> {
        let checkpoint = Checkpoint::new(self.outputs.files(), ResumeKey::Description);
        if self.options.restart {
            checkpoint.restart()?;
            Ok(ResumeState::new(ResumeKey::Description))
        } else {
            Ok(checkpoint.resume_or_restart()?)
        }
    }

    /// Process `records`. When `shutdown` completes, the records geocoded so
    /// far in the current batch are written and the job stops.
    pub async fn run<S>(
        &mut self,
        records: Vec<Property>,
        shutdown: S,
    ) -> Result<ProcessSummary, JobError>
    where
        S: Future<Output = ()>,
    {
        let mut summary = ProcessSummary::default();

        info!(records = records.len(), "===== CLEANING DATA =====");
        let (cleaned, cleaning) = DataCleaner::new().clean(records);
        summary.cleaning = cleaning;
        info!(
            kept = cleaning.kept(),
            empty = cleaning.empty,
            duplicates = cleaning.duplicates,
            "Cleaning complete"
        );

        let transformed = DataTransformer::new().transform(cleaned);

        let state = self.resume_state()?;
        let (mut pending, resumed) = state.pending(transformed);
        summary.resumed = resumed;
        if resumed > 0 {
            info!(
                skipped = resumed,
                remaining = pending.len(),
                "Skipping already processed records"
            );
        }

        let geocoder = match self.geocoder.as_deref_mut() {
            Some(chain) if !self.options.skip_geocoding => chain,
            _ => {
                info!("Geocoding skipped");
                for record in &mut pending {
                    record.set_coordinates(None);
                }
                summary.written = self.outputs.append(&pending)?;
                return Ok(summary);
            }
        };

        info!(
            batch_size = self.options.batch_size,
            providers = ?geocoder.provider_names(),
            "===== GEOCODING ====="
        );
        tokio::pin!(shutdown);

        let batch_size = self.options.batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size);
        for (index, chunk) in pending.chunks(batch_size).enumerate() {
            let mut batch = Vec::with_capacity(chunk.len());
            for record in chunk {
                let mut record = record.clone();
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        warn!("Interrupted, saving partial batch");
                        summary.interrupted = true;
                        break;
                    }
                    coords = geocoder.locate(record.location_text()) => {
                        if coords.is_some() {
                            summary.geocoded += 1;
                        }
                        record.set_coordinates(coords);
                        batch.push(record);
                    }
                }
            }

            summary.written += self.outputs.append(&batch)?;
            info!(
                batch = index + 1,
                of = total_batches,
                saved = batch.len(),
                geocoded = summary.geocoded,
                "💾 Saved batch"
            );
            if summary.interrupted {
                break;
            }
        }

        Ok(summary)
    }
}
