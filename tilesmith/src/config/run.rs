//! Immutable per-run configuration.

use std::fmt;
use std::path::PathBuf;

use super::ConfigFile;

/// Highest zoom level the renderer supports.
pub const MAX_RENDER_ZOOM: u8 = 16;

/// Errors detected while assembling or validating a run configuration.
///
/// These are all reported before any network activity or external tool
/// invocation starts.
#[derive(Debug)]
pub enum ConfigError {
    /// minZoom is greater than maxZoom.
    ZoomOrdering { min_zoom: u8, max_zoom: u8 },

    /// maxZoom exceeds what the renderer supports.
    ZoomTooHigh { max_zoom: u8 },

    /// Bridged execution requested without a bridge target.
    MissingBridgeTarget,

    /// Unrecognized execution mode string.
    UnknownExecMode(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZoomOrdering { min_zoom, max_zoom } => {
                write!(
                    f,
                    "invalid zoom range: minZoom {} exceeds maxZoom {}",
                    min_zoom, max_zoom
                )
            }
            ConfigError::ZoomTooHigh { max_zoom } => {
                write!(
                    f,
                    "maxZoom {} exceeds renderer maximum of {}",
                    max_zoom, MAX_RENDER_ZOOM
                )
            }
            ConfigError::MissingBridgeTarget => {
                write!(f, "bridged execution requires a bridge target")
            }
            ConfigError::UnknownExecMode(mode) => {
                write!(f, "unknown execution mode '{}' (expected 'native' or 'bridged')", mode)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// How external tools are invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// Run renderer and converter directly in this environment.
    Native,

    /// Run them inside the remote execution bridge with translated paths.
    Bridged,
}

impl ExecMode {
    /// Parse an execution mode string from configuration.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(ExecMode::Native),
            "bridged" => Ok(ExecMode::Bridged),
            other => Err(ConfigError::UnknownExecMode(other.to_string())),
        }
    }
}

/// The immutable configuration for one pipeline run.
///
/// Constructed once at startup and passed by reference into every
/// component; nothing in the pipeline reads ambient environment state.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Directory build outputs are written to.
    pub output_dir: PathBuf,

    /// Directory auxiliary datasets live in.
    pub data_dir: PathBuf,

    /// Scratch directory for the materialized render config and the
    /// renderer's tile store.
    pub work_dir: PathBuf,

    /// Minimum zoom level for rendered archives.
    pub min_zoom: u8,

    /// Maximum zoom level for rendered archives.
    pub max_zoom: u8,

    /// Direct fetch attempts before the fallback transport.
    pub fetch_attempts: u32,

    /// Minimum free disk space in bytes required to start.
    pub min_free_bytes: u64,

    /// Whether raw extracts are verified against checksum sidecars.
    pub verify_checksums: bool,

    /// Whether missing auxiliary datasets are downloaded automatically.
    pub auto_fetch_datasets: bool,

    /// Execution mode for external tools.
    pub exec_mode: ExecMode,

    /// Bridge target identifier (e.g. a WSL distribution name).
    pub bridge_target: String,

    /// Renderer command name.
    pub renderer_cmd: String,

    /// Converter command name.
    pub converter_cmd: String,

    /// URL prefix for manifest entries; empty leaves entry URLs empty.
    pub publish_url_prefix: String,

    /// Delete the intermediate rendered archive after conversion.
    pub remove_rendered: bool,
}

impl RunConfig {
    /// Assemble a run configuration from the persistent config file.
    ///
    /// The CLI applies flag overrides to the returned value before
    /// calling [`RunConfig::validate`].
    pub fn from_config_file(config: &ConfigFile) -> Result<Self, ConfigError> {
        let exec_mode = ExecMode::parse(&config.exec_mode)?;
        Ok(Self {
            output_dir: config.output_dir.clone(),
            data_dir: config.data_dir.clone(),
            work_dir: config.output_dir.join("work"),
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            fetch_attempts: config.fetch_attempts,
            min_free_bytes: config.min_free_bytes,
            verify_checksums: config.verify_checksums,
            auto_fetch_datasets: config.auto_fetch_datasets,
            exec_mode,
            bridge_target: config.bridge_target.clone(),
            renderer_cmd: config.renderer_cmd.clone(),
            converter_cmd: config.converter_cmd.clone(),
            publish_url_prefix: config.publish_url_prefix.clone(),
            remove_rendered: false,
        })
    }

    /// Validate invariants that must hold before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::ZoomOrdering {
                min_zoom: self.min_zoom,
                max_zoom: self.max_zoom,
            });
        }
        if self.max_zoom > MAX_RENDER_ZOOM {
            return Err(ConfigError::ZoomTooHigh {
                max_zoom: self.max_zoom,
            });
        }
        if self.exec_mode == ExecMode::Bridged && self.bridge_target.is_empty() {
            return Err(ConfigError::MissingBridgeTarget);
        }
        Ok(())
    }
}
