use crate::error::StoreError;
use crate::models::Property;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A CSV or TSV file holding `Property` rows.
///
/// The delimiter follows the extension: `.tsv` is tab separated, anything
/// else is comma separated. Rows are appended in batches and the header is
/// only written when the file is new or empty.
#[derive(Debug, Clone)]
pub struct DelimitedFile {
    path: PathBuf,
    delimiter: u8,
}

impl DelimitedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
            _ => b',',
        };
        Self { path, delimiter }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or zero-length
    pub fn is_blank(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn ensure_parent(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))
            }
            _ => Ok(()),
        }
    }

    fn writer(&self, file: File) -> csv::Writer<File> {
        csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(file)
    }

    /// Truncate to a header-only file.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.write_all(&[]).map(|_| ())
    }

    /// Replace the file contents with `records`.
    pub fn write_all(&self, records: &[Property]) -> Result<usize, StoreError> {
        self.ensure_parent()?;
        let file = File::create(&self.path).map_err(|e| self.io_err(e))?;
        let mut writer = self.writer(file);
        writer
            .write_record(Property::COLUMNS)
            .map_err(|e| self.csv_err(e))?;
        for record in records {
            writer
                .serialize(sanitize(record))
                .map_err(|e| self.csv_err(e))?;
        }
        writer.flush().map_err(|e| self.io_err(e))?;
        Ok(records.len())
    }

    /// Append `records`, writing the header first if the file is new or empty.
    pub fn append(&self, records: &[Property]) -> Result<usize, StoreError> {
        self.ensure_parent()?;
        let needs_header = self.is_blank();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let mut writer = self.writer(file);

        if needs_header {
            writer
                .write_record(Property::COLUMNS)
                .map_err(|e| self.csv_err(e))?;
        }
        for record in records {
            writer
                .serialize(sanitize(record))
                .map_err(|e| self.csv_err(e))?;
        }
        writer.flush().map_err(|e| self.io_err(e))?;

        debug!(path = %self.path.display(), rows = records.len(), "Appended rows");
        Ok(records.len())
    }

    fn reader(&self) -> Result<csv::Reader<File>, StoreError> {
        let file = File::open(&self.path).map_err(|e| self.io_err(e))?;
        Ok(csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(file))
    }

    /// Header row, or `None` for a missing or empty file.
    pub fn headers(&self) -> Result<Option<Vec<String>>, StoreError> {
        if self.is_blank() {
            return Ok(None);
        }
        let mut reader = self.reader()?;
        let headers = reader.headers().map_err(|e| self.csv_err(e))?;
        Ok(Some(headers.iter().map(|h| h.trim().to_string()).collect()))
    }

    /// Every well-formed row. Rows with the wrong number of fields, or values
    /// that do not fit the record, are skipped. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<Property>, StoreError> {
        if self.is_blank() {
            return Ok(Vec::new());
        }
        let mut reader = self.reader()?;
        let headers = reader.headers().map_err(|e| self.csv_err(e))?.clone();

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in reader.records() {
            let row = row.map_err(|e| self.csv_err(e))?;
            if row.len() != headers.len() {
                skipped += 1;
                continue;
            }
            match row.deserialize::<Property>(Some(&headers)) {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "Skipping row");
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped,
                kept = records.len(),
                "Skipped malformed rows"
            );
        }
        Ok(records)
    }
}

fn clean_text(text: &str) -> String {
    text.replace(['\n', '\r', '\t'], " ")
}

/// Copy of `record` with line breaks and tabs in text fields turned into spaces
pub fn sanitize(record: &Property) -> Property {
    let clean_opt = |v: &Option<String>| v.as_deref().map(clean_text);
    Property {
        description: clean_text(&record.description),
        address: clean_text(&record.address),
        property_type: clean_text(&record.property_type),
        state: clean_opt(&record.state),
        city: clean_opt(&record.city),
        link: clean_opt(&record.link),
        data_source: clean_opt(&record.data_source),
        ..record.clone()
    }
}
