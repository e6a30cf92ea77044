//! Build manifest assembly and serialization.
//!
//! One manifest per pipeline run: created empty at run start, appended
//! to as each region completes, and written exactly once at the end.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Format tag recorded for converted archives.
pub const OUTPUT_FORMAT: &str = "pmtiles";

/// One completed region in the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Region slug.
    pub name: String,

    /// Output filename of the converted archive.
    pub file: String,

    /// Byte length of the converted archive at write time.
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,

    /// Publish URL, empty when no prefix is configured.
    pub url: String,
}

/// The published description of one pipeline run's outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// ISO-8601 generation timestamp.
    #[serde(rename = "generatedAt")]
    pub generated_at: String,

    /// Output format tag.
    pub format: String,

    /// Effective minimum zoom of the run.
    #[serde(rename = "minZoom")]
    pub min_zoom: u8,

    /// Effective maximum zoom of the run.
    #[serde(rename = "maxZoom")]
    pub max_zoom: u8,

    /// Completed regions, in processing order.
    pub regions: Vec<ManifestEntry>,
}

impl BuildManifest {
    /// Create an empty manifest stamped with the current time.
    pub fn new(min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            format: OUTPUT_FORMAT.to_string(),
            min_zoom,
            max_zoom,
            regions: Vec::new(),
        }
    }

    /// Append a completed region.
    pub fn push(&mut self, entry: ManifestEntry) {
        self.regions.push(entry);
    }

    /// Number of recorded regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no region has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Serialize to pretty JSON (UTF-8, no byte-order mark).
    pub fn to_json(&self) -> String {
        let mut text =
            serde_json::to_string_pretty(self).expect("manifest serialization cannot fail");
        text.push('\n');
        text
    }

    /// Write the manifest, overwriting any prior file at `path`.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_json())
    }

    /// Load a manifest from disk.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(io::Error::other)
    }
}
