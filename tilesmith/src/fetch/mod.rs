//! Artifact acquisition with bounded retries and a fallback transport.
//!
//! Downloads are idempotent: a destination that already exists is a
//! no-op success. Callers that want to force a re-fetch delete the file
//! first. Partial files from failed attempts are not cleaned up here;
//! the integrity verifier decides their fate.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;

mod error;
pub mod http;

pub use error::{FetchError, FetchResult};
pub use http::{BulkTransport, CurlTransport, HttpClient, ReqwestClient};

/// Downloads URLs to files with retries, backoff, and an optional
/// fallback bulk transport.
pub struct Fetcher {
    client: Box<dyn HttpClient>,
    fallback: Option<Box<dyn BulkTransport>>,
}

impl Fetcher {
    /// Create a fetcher with the given HTTP client and no fallback.
    pub fn new(client: Box<dyn HttpClient>) -> Self {
        Self {
            client,
            fallback: None,
        }
    }

    /// Add a fallback bulk transport tried once after all direct
    /// attempts fail.
    pub fn with_fallback(mut self, fallback: Box<dyn BulkTransport>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Download `url` to `dest`.
    ///
    /// - No-op success when `dest` already exists.
    /// - Up to `max_attempts` direct attempts with exponential backoff
    ///   (2 × attempt-number seconds between attempts).
    /// - One final attempt through the fallback transport, if available.
    ///
    /// Parent directories are created as needed. The cancellation token
    /// is checked between attempts, not mid-download.
    pub fn fetch(
        &self,
        url: &str,
        dest: &Path,
        max_attempts: u32,
        cancel: &CancelToken,
    ) -> FetchResult<()> {
        if dest.exists() {
            debug!(dest = %dest.display(), "already present, skipping download");
            return Ok(());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            info!(url, attempt, max_attempts, "downloading");
            match self.client.fetch_to(url, dest) {
                Ok(bytes) => {
                    info!(url, bytes, "download complete");
                    return Ok(());
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "download attempt failed");
                    if attempt < max_attempts {
                        thread::sleep(Duration::from_secs(2 * u64::from(attempt)));
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if fallback.is_available() {
                info!(url, "direct attempts exhausted, trying fallback transport");
                match fallback.transfer(url, dest) {
                    Ok(()) => {
                        info!(url, "fallback transfer complete");
                        return Ok(());
                    }
                    Err(e) => warn!(url, error = %e, "fallback transfer failed"),
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }
}
