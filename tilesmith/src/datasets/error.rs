//! Error types for dataset provisioning.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::fetch::FetchError;

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors that can occur while provisioning auxiliary datasets.
#[derive(Debug)]
pub enum DatasetError {
    /// An expected dataset file is missing and cannot (or may not) be
    /// acquired.
    MissingData {
        kind: &'static str,
        missing: PathBuf,
    },

    /// Downloading a dataset archive failed.
    Fetch {
        kind: &'static str,
        source: FetchError,
    },

    /// Unpacking a dataset archive failed, including the retry through
    /// a temporary copy.
    Extract { archive: PathBuf, reason: String },

    /// Filesystem error while arranging extracted files.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::MissingData { kind, missing } => {
                write!(
                    f,
                    "missing {} data: {} not found and auto-acquisition is unavailable",
                    kind,
                    missing.display()
                )
            }
            DatasetError::Fetch { kind, source } => {
                write!(f, "failed to download {} data: {}", kind, source)
            }
            DatasetError::Extract { archive, reason } => {
                write!(f, "failed to extract {}: {}", archive.display(), reason)
            }
            DatasetError::Io { path, source } => {
                write!(f, "io error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Fetch { source, .. } => Some(source),
            DatasetError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
