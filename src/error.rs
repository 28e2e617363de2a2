//! Typed errors for the fetch, geocode, checkpoint and storage layers.
//!
//! The binary wraps these in `anyhow` at the command boundary; inside a run
//! most of them are logged and turned into a skipped page or record.

use std::path::PathBuf;

/// Errors from fetching a listing or detail page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after_secs: Option<u64>,
    },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// Transient failures worth another attempt: 429, 5xx and transport errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::RetriesExhausted { .. } | FetchError::Browser(_) => false,
        }
    }

    /// HTTP status behind the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

/// Errors from a geocoding provider.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("{provider} timed out")]
    Timeout { provider: &'static str },

    #[error("{provider} service error: {message}")]
    Service {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rejected the request: {message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },
}

impl GeocodeError {
    /// Timeouts and service hiccups get one more try; rejections do not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GeocodeError::Timeout { .. } | GeocodeError::Service { .. }
        )
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Errors while re-reading previous output to resume a job.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("cannot read checkpoint {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("checkpoint {path} has no {column} column")]
    MissingKeyColumn { path: PathBuf, column: &'static str },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(StoreError),
}

/// Errors from the file sink and the document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot read workbook {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::XlsxError,
    },

    #[error("document store error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("cannot encode record: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),

    #[error("document store credentials missing: {0}")]
    MissingCredentials(String),
}

/// Failure of a resumable job: its checkpoint or its output.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
