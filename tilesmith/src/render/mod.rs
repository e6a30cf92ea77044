//! Renderer configuration.
//!
//! The renderer consumes a JSON layer configuration and a processing
//! script. Both are derived from bundled templates: the configuration
//! gets its per-layer zoom bounds clamped into the run's zoom window,
//! and both files are persisted into the working directory together
//! with a fingerprint sidecar recording what they were derived from.

mod config;
mod error;
mod template;

pub use config::RenderConfig;
pub use error::{RenderConfigError, RenderConfigResult};
pub use template::{
    materialize, MaterializedConfig, TemplateSource, CONFIG_FILENAME, MIN_SCRIPT_LINES,
    SCRIPT_FILENAME,
};
