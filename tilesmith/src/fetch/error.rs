//! Error types for artifact acquisition.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while downloading an artifact.
#[derive(Debug)]
pub enum FetchError {
    /// The HTTP request failed before a response arrived.
    Request { url: String, reason: String },

    /// The server answered with a non-success status.
    HttpStatus { url: String, status: u16 },

    /// The request timed out.
    Timeout { url: String, timeout_secs: u64 },

    /// Failed to create the destination's parent directory.
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to write the downloaded bytes.
    WriteFailed { path: PathBuf, source: io::Error },

    /// The fallback bulk transport failed.
    FallbackFailed { url: String, reason: String },

    /// Every direct attempt and the fallback were exhausted.
    Exhausted { url: String, attempts: u32 },

    /// Cancellation was requested between attempts.
    Cancelled,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Request { url, reason } => {
                write!(f, "request to {} failed: {}", url, reason)
            }
            FetchError::HttpStatus { url, status } => {
                write!(f, "HTTP {} from {}", status, url)
            }
            FetchError::Timeout { url, timeout_secs } => {
                write!(f, "request to {} timed out after {}s", url, timeout_secs)
            }
            FetchError::CreateDirFailed { path, source } => {
                write!(f, "failed to create directory {}: {}", path.display(), source)
            }
            FetchError::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            FetchError::FallbackFailed { url, reason } => {
                write!(f, "fallback transfer of {} failed: {}", url, reason)
            }
            FetchError::Exhausted { url, attempts } => {
                write!(
                    f,
                    "giving up on {} after {} attempts and fallback",
                    url, attempts
                )
            }
            FetchError::Cancelled => write!(f, "fetch cancelled"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::CreateDirFailed { source, .. } => Some(source),
            FetchError::WriteFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_exhausted_display() {
        let err = FetchError::Exhausted {
            url: "https://example.com/x.pbf".to_string(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("x.pbf"));
    }

    #[test]
    fn test_error_source() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = FetchError::WriteFailed {
            path: PathBuf::from("/out/file"),
            source: io_err,
        };
        assert!(err.source().is_some());

        let err = FetchError::Cancelled;
        assert!(err.source().is_none());
    }
}
