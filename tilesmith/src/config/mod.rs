//! Build configuration.
//!
//! Two layers:
//! - [`ConfigFile`] - persistent user settings in `~/.tilesmith/config.ini`.
//! - [`RunConfig`] - the immutable per-run configuration assembled once at
//!   startup from the config file and CLI arguments, then passed by
//!   reference into every component. No component reads ambient
//!   environment state directly.

mod file;
mod run;
mod size;

pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use run::{ConfigError, ExecMode, RunConfig, MAX_RENDER_ZOOM};
pub use size::format_size;
