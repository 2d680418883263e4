//! Error types for one ingestion call.
//!
//! Every variant aborts the current call with no partial state committed:
//! no block appended, no pending-pair mutation, no identifier admitted.
//! Duplicates, malformed names and orphan evictions are not errors; they
//! are reported through [`Outcome`](crate::engine::Outcome).

use std::path::PathBuf;

/// Failure of a single ingestion call.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The image could not be retrieved.
    #[error("failed to fetch image '{key}': {source}")]
    Fetch {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The vision routine could not compute a pixel area.
    #[error("area extraction failed for '{key}': {source}")]
    Extraction {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The classifier could not label the image.
    #[error("classification failed for '{key}': {source}")]
    Classification {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The local history file could not be written.
    #[error("failed to persist history to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local history file could not be read (permissions, I/O).
    #[error("failed to read history from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local history file exists but cannot be parsed.
    #[error("history file {path} is not valid history: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The critical section task died before finishing.
    #[error("ingestion task aborted: {0}")]
    Aborted(String),
}

impl IngestError {
    /// Whether retrying the same submission can succeed.
    ///
    /// I/O and collaborator failures are transient from the
    /// engine's point of view; a corrupt history needs an operator.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IngestError::Corrupt { .. })
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
