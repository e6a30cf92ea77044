//! Checksum verification for downloaded artifacts.
//!
//! An artifact is paired with a one-line sidecar file whose first
//! whitespace-delimited token is the expected SHA-256 hash. Verification
//! never raises: any missing file, unparsable sidecar, or persistent
//! lock contention is reported as `false` and the caller decides what
//! to do about it.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::thread;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Buffer size for hashing (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Attempts made to open a file that another process holds locked.
const OPEN_ATTEMPTS: u32 = 3;

/// Base delay between open attempts.
const OPEN_RETRY_DELAY_MS: u64 = 500;

/// Verify `artifact` against its checksum sidecar.
///
/// Returns false, never an error, when either file is missing, the
/// sidecar's first line is empty or has no hash token, or the artifact
/// stays locked past the bounded retry. Hash comparison is
/// case-insensitive.
pub fn verify(artifact: &Path, sidecar: &Path) -> bool {
    let expected = match expected_hash(sidecar) {
        Some(hash) => hash,
        None => {
            debug!(sidecar = %sidecar.display(), "no parsable hash in sidecar");
            return false;
        }
    };

    let actual = match file_sha256_with_retry(artifact) {
        Ok(hash) => hash,
        Err(e) => {
            warn!(artifact = %artifact.display(), error = %e, "could not hash artifact");
            return false;
        }
    };

    let matches = actual.eq_ignore_ascii_case(&expected);
    if !matches {
        warn!(
            artifact = %artifact.display(),
            expected,
            actual,
            "checksum mismatch"
        );
    }
    matches
}

/// Parse the expected hash from a sidecar file.
///
/// The hash is the first whitespace-delimited token of the first line.
pub fn expected_hash(sidecar: &Path) -> Option<String> {
    let content = std::fs::read_to_string(sidecar).ok()?;
    let first_line = content.lines().next()?;
    let token = first_line.split_whitespace().next()?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Compute the SHA-256 of a file as lowercase hex.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash a file, retrying with backoff if it is transiently locked.
///
/// Background scanners commonly hold freshly written files open for a
/// moment; waiting briefly beats failing the run.
fn file_sha256_with_retry(path: &Path) -> io::Result<String> {
    let mut last_err = None;

    for attempt in 1..=OPEN_ATTEMPTS {
        match file_sha256(path) {
            Ok(hash) => return Ok(hash),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "file not readable yet, retrying"
                );
                last_err = Some(e);
                if attempt < OPEN_ATTEMPTS {
                    thread::sleep(Duration::from_millis(OPEN_RETRY_DELAY_MS * u64::from(attempt)));
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("unreadable file")))
}
