//! Error types for renderer configuration.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type for render-config operations.
pub type RenderConfigResult<T> = Result<T, RenderConfigError>;

/// Errors that can occur while materializing the renderer configuration.
#[derive(Debug)]
pub enum RenderConfigError {
    /// A bundled template file is missing.
    TemplateMissing(PathBuf),

    /// The configuration template is not valid JSON.
    TemplateParse { path: PathBuf, reason: String },

    /// The bundled processing script is too short to be a real template
    /// and no bridge-side copy is available.
    TemplateUnusable { path: PathBuf, lines: usize },

    /// Fetching the template from the bridge environment failed.
    BridgeFetch { reason: String },

    /// Failed to read a template or write a materialized file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for RenderConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderConfigError::TemplateMissing(path) => {
                write!(f, "template not found: {}", path.display())
            }
            RenderConfigError::TemplateParse { path, reason } => {
                write!(f, "invalid template {}: {}", path.display(), reason)
            }
            RenderConfigError::TemplateUnusable { path, lines } => {
                write!(
                    f,
                    "processing script {} has only {} lines and no bridge copy is available",
                    path.display(),
                    lines
                )
            }
            RenderConfigError::BridgeFetch { reason } => {
                write!(f, "failed to fetch template from bridge: {}", reason)
            }
            RenderConfigError::Io { path, source } => {
                write!(f, "io error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for RenderConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
