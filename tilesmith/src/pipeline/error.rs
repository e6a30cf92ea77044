//! Top-level build errors.
//!
//! Every component failure that stops a run surfaces here, with enough
//! context (region, stage, path) to act on without reading the log.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::datasets::DatasetError;
use crate::fetch::FetchError;
use crate::render::RenderConfigError;
use crate::stage::StageError;

/// Result type for pipeline operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// A failure that stops the pipeline run.
#[derive(Debug)]
pub enum BuildError {
    /// Invalid run configuration.
    Config(ConfigError),

    /// Not enough free disk space to start the run.
    InsufficientDisk { available: u64, required: u64 },

    /// Auxiliary dataset provisioning failed.
    Dataset(DatasetError),

    /// Renderer configuration could not be materialized.
    RenderConfig(RenderConfigError),

    /// Downloading a region's raw extract or sidecar failed.
    Fetch { region: String, source: FetchError },

    /// A freshly downloaded extract failed checksum verification.
    Integrity { region: String, artifact: PathBuf },

    /// An external stage tool failed.
    Stage(StageError),

    /// Writing the build manifest failed.
    ManifestWrite { path: PathBuf, source: io::Error },

    /// Filesystem error outside any more specific category.
    Io { path: PathBuf, source: io::Error },

    /// The run was cancelled.
    Cancelled,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Config(e) => write!(f, "configuration error: {}", e),
            BuildError::InsufficientDisk {
                available,
                required,
            } => {
                write!(
                    f,
                    "insufficient disk space: {} bytes available, {} required",
                    available, required
                )
            }
            BuildError::Dataset(e) => write!(f, "{}", e),
            BuildError::RenderConfig(e) => write!(f, "{}", e),
            BuildError::Fetch { region, source } => {
                write!(f, "failed to acquire extract for region '{}': {}", region, source)
            }
            BuildError::Integrity { region, artifact } => {
                write!(
                    f,
                    "checksum verification failed for region '{}' ({})",
                    region,
                    artifact.display()
                )
            }
            BuildError::Stage(e) => write!(f, "{}", e),
            BuildError::ManifestWrite { path, source } => {
                write!(f, "failed to write manifest {}: {}", path.display(), source)
            }
            BuildError::Io { path, source } => {
                write!(f, "io error on {}: {}", path.display(), source)
            }
            BuildError::Cancelled => write!(f, "build cancelled"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Config(e) => Some(e),
            BuildError::Dataset(e) => Some(e),
            BuildError::RenderConfig(e) => Some(e),
            BuildError::Fetch { source, .. } => Some(source),
            BuildError::Stage(e) => Some(e),
            BuildError::ManifestWrite { source, .. } => Some(source),
            BuildError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        BuildError::Config(e)
    }
}

impl From<DatasetError> for BuildError {
    fn from(e: DatasetError) -> Self {
        BuildError::Dataset(e)
    }
}

impl From<RenderConfigError> for BuildError {
    fn from(e: RenderConfigError) -> Self {
        BuildError::RenderConfig(e)
    }
}

impl From<StageError> for BuildError {
    fn from(e: StageError) -> Self {
        BuildError::Stage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_display_names_region_and_artifact() {
        let err = BuildError::Integrity {
            region: "se_sweden".to_string(),
            artifact: PathBuf::from("/build/se_sweden.osm.pbf"),
        };
        let msg = err.to_string();
        assert!(msg.contains("se_sweden"));
        assert!(msg.contains("se_sweden.osm.pbf"));
    }

    #[test]
    fn test_fetch_error_has_source() {
        use std::error::Error;
        let err = BuildError::Fetch {
            region: "no_norway".to_string(),
            source: FetchError::Cancelled,
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn test_insufficient_disk_display() {
        let err = BuildError::InsufficientDisk {
            available: 1000,
            required: 2000,
        };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("2000"));
    }
}
