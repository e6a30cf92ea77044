//! Configuration file handling for ~/.tilesmith/config.ini.
//!
//! Loads and saves user configuration with sensible defaults. These are
//! the durable settings; per-run values are assembled into
//! [`super::RunConfig`] by the CLI.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

/// Default number of direct fetch attempts before the fallback transport.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Default minimum free disk space before a run is allowed to start (40 GB).
///
/// A single regional build can need tens of gigabytes for the raw extract,
/// the rendered archive, and the converted archive together.
pub const DEFAULT_MIN_FREE_BYTES: u64 = 40 * 1024 * 1024 * 1024;

/// Default zoom window for rendered archives.
pub const DEFAULT_MIN_ZOOM: u8 = 0;
pub const DEFAULT_MAX_ZOOM: u8 = 14;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// Failed to write config file
    #[error("failed to write config file: {0}")]
    Write(String),

    /// Failed to create config directory
    #[error("failed to create config directory: {0}")]
    Directory(std::io::Error),
}

/// Persistent user configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFile {
    /// Directory build outputs are written to.
    pub output_dir: PathBuf,

    /// Directory auxiliary datasets (coastline, landcover) live in.
    pub data_dir: PathBuf,

    /// Minimum zoom level for rendered archives.
    pub min_zoom: u8,

    /// Maximum zoom level for rendered archives.
    pub max_zoom: u8,

    /// Direct fetch attempts before falling back to the bulk transport.
    pub fetch_attempts: u32,

    /// Minimum free disk space in bytes required to start a run.
    pub min_free_bytes: u64,

    /// Whether raw extracts are verified against their checksum sidecars.
    pub verify_checksums: bool,

    /// Whether missing auxiliary datasets are downloaded automatically.
    pub auto_fetch_datasets: bool,

    /// Execution mode: "native" or "bridged".
    pub exec_mode: String,

    /// Bridge target identifier (e.g. a WSL distribution name).
    pub bridge_target: String,

    /// Renderer command name.
    pub renderer_cmd: String,

    /// Converter command name.
    pub converter_cmd: String,

    /// Optional URL prefix prepended to manifest entries.
    pub publish_url_prefix: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("build"),
            data_dir: PathBuf::from("data"),
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
            verify_checksums: true,
            auto_fetch_datasets: true,
            exec_mode: "native".to_string(),
            bridge_target: String::new(),
            renderer_cmd: "tilemaker".to_string(),
            converter_cmd: "pmtiles".to_string(),
            publish_url_prefix: String::new(),
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.tilesmith/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("build")) {
            if let Some(v) = section.get("output_dir") {
                config.output_dir = PathBuf::from(v);
            }
            if let Some(v) = section.get("data_dir") {
                config.data_dir = PathBuf::from(v);
            }
            if let Some(v) = section.get("min_free_bytes").and_then(|v| v.parse().ok()) {
                config.min_free_bytes = v;
            }
        }

        if let Some(section) = ini.section(Some("zoom")) {
            if let Some(v) = section.get("min").and_then(|v| v.parse().ok()) {
                config.min_zoom = v;
            }
            if let Some(v) = section.get("max").and_then(|v| v.parse().ok()) {
                config.max_zoom = v;
            }
        }

        if let Some(section) = ini.section(Some("fetch")) {
            if let Some(v) = section.get("attempts").and_then(|v| v.parse().ok()) {
                config.fetch_attempts = v;
            }
            if let Some(v) = section.get("verify_checksums").and_then(parse_bool) {
                config.verify_checksums = v;
            }
        }

        if let Some(section) = ini.section(Some("datasets")) {
            if let Some(v) = section.get("auto_fetch").and_then(parse_bool) {
                config.auto_fetch_datasets = v;
            }
        }

        if let Some(section) = ini.section(Some("bridge")) {
            if let Some(v) = section.get("mode") {
                config.exec_mode = v.to_string();
            }
            if let Some(v) = section.get("target") {
                config.bridge_target = v.to_string();
            }
        }

        if let Some(section) = ini.section(Some("tools")) {
            if let Some(v) = section.get("renderer") {
                config.renderer_cmd = v.to_string();
            }
            if let Some(v) = section.get("converter") {
                config.converter_cmd = v.to_string();
            }
        }

        if let Some(section) = ini.section(Some("publish")) {
            if let Some(v) = section.get("url_prefix") {
                config.publish_url_prefix = v.to_string();
            }
        }

        Ok(config)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::Directory)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some("build"))
            .set("output_dir", self.output_dir.to_string_lossy().to_string())
            .set("data_dir", self.data_dir.to_string_lossy().to_string())
            .set("min_free_bytes", self.min_free_bytes.to_string());
        ini.with_section(Some("zoom"))
            .set("min", self.min_zoom.to_string())
            .set("max", self.max_zoom.to_string());
        ini.with_section(Some("fetch"))
            .set("attempts", self.fetch_attempts.to_string())
            .set("verify_checksums", self.verify_checksums.to_string());
        ini.with_section(Some("datasets"))
            .set("auto_fetch", self.auto_fetch_datasets.to_string());
        ini.with_section(Some("bridge"))
            .set("mode", self.exec_mode.clone())
            .set("target", self.bridge_target.clone());
        ini.with_section(Some("tools"))
            .set("renderer", self.renderer_cmd.clone())
            .set("converter", self.converter_cmd.clone());
        ini.with_section(Some("publish"))
            .set("url_prefix", self.publish_url_prefix.clone());

        ini.write_to_file(path)
            .map_err(|e| ConfigFileError::Write(e.to_string()))
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Get the path to the config directory (~/.tilesmith).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilesmith")
}

/// Get the path to the config file (~/.tilesmith/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
