//! Resume support: previously written output is the checkpoint.
//!
//! Every job appends rows as it goes, so re-reading its output files tells
//! which records are already done. A file that cannot be read is copied to
//! `<file>.backup_<unix-seconds>` and every output starts over.

use crate::error::{CheckpointError, StoreError};
use crate::models::Property;
use crate::storage::DelimitedFile;
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Which field identifies a record across runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKey {
    /// Trimmed description (scrape and process jobs)
    Description,
    /// Detail page URL, or the description for listings without one
    /// (detail enrichment)
    Link,
}

impl ResumeKey {
    pub fn column(&self) -> &'static str {
        match self {
            ResumeKey::Description => "description",
            ResumeKey::Link => "link",
        }
    }

    pub fn of<'a>(&self, record: &'a Property) -> Option<&'a str> {
        match self {
            ResumeKey::Description => record.resume_key(),
            ResumeKey::Link => record
                .link
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .or_else(|| record.resume_key()),
        }
    }
}

/// Keys already written, with whether that record was geocoded
#[derive(Debug, Clone)]
pub struct ResumeState {
    key: ResumeKey,
    done: HashMap<String, bool>,
}

impl ResumeState {
    pub fn new(key: ResumeKey) -> Self {
        Self {
            key,
            done: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn with_coordinates(&self) -> usize {
        self.done.values().filter(|has| **has).count()
    }

    pub fn contains(&self, record: &Property) -> bool {
        self.key
            .of(record)
            .is_some_and(|k| self.done.contains_key(k))
    }

    /// Remember a written record
    pub fn mark(&mut self, record: &Property) {
        if let Some(key) = self.key.of(record) {
            self.done
                .insert(key.to_string(), record.coordinates().is_some());
        }
    }

    /// Records not written yet, and how many were skipped
    pub fn pending(&self, records: Vec<Property>) -> (Vec<Property>, usize) {
        let total = records.len();
        let pending: Vec<Property> = records.into_iter().filter(|r| !self.contains(r)).collect();
        let skipped = total - pending.len();
        (pending, skipped)
    }
}

fn checkpoint_err(err: StoreError) -> CheckpointError {
    match err {
        StoreError::Csv { path, source } => CheckpointError::Unreadable { path, source },
        StoreError::Io { path, source } => CheckpointError::Io { path, source },
        other => CheckpointError::Store(other),
    }
}

/// The output files of one job, read back as its checkpoint
#[derive(Debug, Clone)]
pub struct Checkpoint {
    files: Vec<DelimitedFile>,
    key: ResumeKey,
}

impl Checkpoint {
    pub fn new(files: Vec<DelimitedFile>, key: ResumeKey) -> Self {
        Self { files, key }
    }

    /// Read every existing output file. Fails if any of them is unreadable.
    pub fn load(&self) -> Result<ResumeState, CheckpointError> {
        let mut state = ResumeState::new(self.key);
        for file in &self.files {
            let Some(headers) = file.headers().map_err(checkpoint_err)? else {
                continue;
            };
            if !headers.iter().any(|h| h == self.key.column()) {
                return Err(CheckpointError::MissingKeyColumn {
                    path: file.path().to_path_buf(),
                    column: self.key.column(),
                });
            }
            let records = file.read_all().map_err(checkpoint_err)?;
            info!(
                path = %file.path().display(),
                rows = records.len(),
                "Found existing output"
            );
            for record in &records {
                state.mark(record);
            }
        }
        Ok(state)
    }

    /// Truncate every output file to its header.
    pub fn restart(&self) -> Result<(), CheckpointError> {
        for file in &self.files {
            file.reset().map_err(checkpoint_err)?;
        }
        Ok(())
    }

    /// Copy each existing file aside before starting over.
    fn back_up(&self) -> Result<Vec<PathBuf>, CheckpointError> {
        let stamp = Utc::now().timestamp();
        let mut backups = Vec::new();
        for file in &self.files {
            if !file.path().exists() {
                continue;
            }
            let backup = PathBuf::from(format!("{}.backup_{stamp}", file.path().display()));
            fs::copy(file.path(), &backup).map_err(|source| CheckpointError::Io {
                path: backup.clone(),
                source,
            })?;
            warn!(
                path = %file.path().display(),
                backup = %backup.display(),
                "Backed up unreadable output"
            );
            backups.push(backup);
        }
        Ok(backups)
    }

    /// Resume from existing output, or start fresh when there is none or it
    /// cannot be read.
    pub fn resume_or_restart(&self) -> Result<ResumeState, CheckpointError> {
        match self.load() {
            Ok(state) if !state.is_empty() => {
                info!(
                    done = state.len(),
                    with_coordinates = state.with_coordinates(),
                    "Resuming from previous output"
                );
                Ok(state)
            }
            Ok(state) => {
                info!("No previous output, starting fresh");
                self.restart()?;
                Ok(state)
            }
            Err(e) => {
                warn!(error = %e, "Cannot resume from previous output, starting fresh");
                self.back_up()?;
                self.restart()?;
                Ok(ResumeState::new(self.key))
            }
        }
    }
}
