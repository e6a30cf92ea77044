//! HTTP client abstraction for testability.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use super::error::FetchError;

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Buffer size for streaming downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Trait for HTTP download operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Download `url` to `dest`, streaming to disk.
    ///
    /// Returns the number of bytes written. The destination's parent
    /// directory must already exist.
    fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// Creates a new client with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a new client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }
}

impl HttpClient for ReqwestClient {
    fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let file = File::create(dest).map_err(|e| FetchError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            let bytes_read = response.read(&mut buffer).map_err(|e| {
                // A partial file is left behind for the caller to judge
                // via checksum verification.
                FetchError::Request {
                    url: url.to_string(),
                    reason: format!("read error: {}", e),
                }
            })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| FetchError::WriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

            written += bytes_read as u64;
        }

        writer.flush().map_err(|e| FetchError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        Ok(written)
    }
}

/// Fallback bulk-transfer transport, tried once after every direct HTTP
/// attempt has failed.
pub trait BulkTransport: Send + Sync {
    /// Whether the transport is usable in this environment.
    fn is_available(&self) -> bool;

    /// Transfer `url` to `dest`.
    fn transfer(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Bulk transport that shells out to `curl`.
///
/// curl retries at the TCP level and follows redirects on its own, which
/// makes it a useful second opinion when the in-process client keeps
/// failing against flaky mirrors.
pub struct CurlTransport;

impl CurlTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkTransport for CurlTransport {
    fn is_available(&self) -> bool {
        std::process::Command::new("curl")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn transfer(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let output = std::process::Command::new("curl")
            .args(["--fail", "--location", "--silent", "--show-error", "--output"])
            .arg(dest)
            .arg(url)
            .output()
            .map_err(|e| FetchError::FallbackFailed {
                url: url.to_string(),
                reason: format!("failed to run curl: {}", e),
            })?;

        if !output.status.success() {
            // curl leaves no output file on --fail, but clean up anyway
            let _ = fs::remove_file(dest);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::FallbackFailed {
                url: url.to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}
