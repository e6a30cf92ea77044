//! Region definitions.
//!
//! A region is one build unit. Its slug uniquely determines every
//! derived path: raw extract, checksum sidecar, rendered archive, and
//! converted archive.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Suffix of the checksum sidecar published next to each extract.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// One build unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Stable slug: lowercase, hyphen/underscore separated.
    pub slug: String,

    /// Human display name.
    pub name: String,

    /// Source URL of the raw extract.
    pub url: String,
}

impl Region {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// URL of the checksum sidecar published next to the extract.
    pub fn checksum_url(&self) -> String {
        format!("{}{}", self.url, CHECKSUM_SUFFIX)
    }

    /// Filename of the raw extract.
    pub fn raw_filename(&self) -> String {
        format!("{}.osm.pbf", self.slug)
    }

    /// Filename of the checksum sidecar.
    pub fn checksum_filename(&self) -> String {
        format!("{}{}", self.raw_filename(), CHECKSUM_SUFFIX)
    }

    /// Filename of the rendered (intermediate) archive.
    pub fn rendered_filename(&self) -> String {
        format!("{}.mbtiles", self.slug)
    }

    /// Filename of the converted (distributable) archive.
    pub fn converted_filename(&self) -> String {
        format!("{}.pmtiles", self.slug)
    }

    pub fn raw_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.raw_filename())
    }

    pub fn checksum_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.checksum_filename())
    }

    pub fn rendered_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.rendered_filename())
    }

    pub fn converted_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.converted_filename())
    }

    /// Whether a slug is acceptable: non-empty, lowercase alphanumerics
    /// with hyphens or underscores.
    pub fn is_valid_slug(slug: &str) -> bool {
        !slug.is_empty()
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.slug)
    }
}

/// The regions built when no region file is supplied.
///
/// One parameterized table instead of one driver script per country.
pub fn builtin_regions() -> Vec<Region> {
    vec![
        Region::new(
            "se_sweden",
            "Sweden",
            "https://download.geofabrik.de/europe/sweden-latest.osm.pbf",
        ),
        Region::new(
            "no_norway",
            "Norway",
            "https://download.geofabrik.de/europe/norway-latest.osm.pbf",
        ),
        Region::new(
            "dk_denmark",
            "Denmark",
            "https://download.geofabrik.de/europe/denmark-latest.osm.pbf",
        ),
        Region::new(
            "fi_finland",
            "Finland",
            "https://download.geofabrik.de/europe/finland-latest.osm.pbf",
        ),
    ]
}

/// Load a region list from a JSON file.
///
/// The file is a JSON array of `{ "slug", "name", "url" }` objects.
pub fn load_regions_file(path: &Path) -> io::Result<Vec<Region>> {
    let text = fs::read_to_string(path)?;
    let regions: Vec<Region> = serde_json::from_str(&text).map_err(io::Error::other)?;

    for region in &regions {
        if !Region::is_valid_slug(&region.slug) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid region slug '{}'", region.slug),
            ));
        }
    }

    Ok(regions)
}
