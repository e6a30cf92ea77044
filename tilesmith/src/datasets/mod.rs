//! Auxiliary dataset provisioning.
//!
//! The renderer needs two reference layers next to the OSM extract:
//! coastline polygons (one archive) and landcover polygons (three
//! Natural Earth archives). Each archive is downloaded once through the
//! [`Fetcher`] and unpacked into its own subdirectory; once the expected
//! shapefiles exist the provisioner never touches the network again.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::bridge::{CommandRunner, CommandSpec};
use crate::cancel::CancelToken;
use crate::config::RunConfig;
use crate::fetch::Fetcher;

mod error;

pub use error::{DatasetError, DatasetResult};

/// Coastline polygons, split for the whole planet.
const COASTLINE_URL: &str =
    "https://osmdata.openstreetmap.de/download/water-polygons-split-4326.zip";

/// Landcover sub-dataset archives (Natural Earth, 10m).
const LANDCOVER_URLS: [&str; 3] = [
    "https://naciscdn.org/naturalearth/10m/cultural/ne_10m_urban_areas.zip",
    "https://naciscdn.org/naturalearth/10m/physical/ne_10m_antarctic_ice_shelves_polys.zip",
    "https://naciscdn.org/naturalearth/10m/physical/ne_10m_glaciated_areas.zip",
];

/// The shapefile the coastline archive must yield, at a fixed flattened
/// location regardless of the archive's internal directory depth.
const COASTLINE_SHAPEFILE: &str = "water_polygons.shp";

/// Auxiliary dataset kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetKind {
    Coastline,
    Landcover,
}

impl DatasetKind {
    /// Name used in paths and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Coastline => "coastline",
            DatasetKind::Landcover => "landcover",
        }
    }

    /// Files that must exist for the dataset to count as provisioned,
    /// relative to the data directory.
    fn expected_files(&self) -> Vec<PathBuf> {
        self.archive_urls()
            .into_iter()
            .flat_map(|url| self.archive_outputs(url))
            .collect()
    }

    /// Files a single archive is expected to yield, relative to the
    /// data directory.
    fn archive_outputs(&self, url: &str) -> Vec<PathBuf> {
        match self {
            DatasetKind::Coastline => {
                vec![PathBuf::from("coastline").join(COASTLINE_SHAPEFILE)]
            }
            DatasetKind::Landcover => {
                let stem = archive_stem(url);
                vec![PathBuf::from("landcover")
                    .join(stem)
                    .join(format!("{}.shp", stem))]
            }
        }
    }

    fn archive_urls(&self) -> Vec<&'static str> {
        match self {
            DatasetKind::Coastline => vec![COASTLINE_URL],
            DatasetKind::Landcover => LANDCOVER_URLS.to_vec(),
        }
    }
}

/// Archive filename without the `.zip` suffix.
fn archive_stem(url: &str) -> &str {
    let file = url.rsplit('/').next().unwrap_or(url);
    file.strip_suffix(".zip").unwrap_or(file)
}

/// Ensure an auxiliary dataset exists under `config.data_dir`.
///
/// Returns immediately when every expected file is present. Otherwise
/// downloads and unpacks the dataset's archives, or fails with
/// [`DatasetError::MissingData`] when auto-acquisition is disabled.
pub fn ensure(
    kind: DatasetKind,
    config: &RunConfig,
    fetcher: &Fetcher,
    runner: &dyn CommandRunner,
    cancel: &CancelToken,
) -> DatasetResult<()> {
    let missing: Vec<PathBuf> = kind
        .expected_files()
        .into_iter()
        .filter(|rel| !config.data_dir.join(rel).exists())
        .collect();

    if missing.is_empty() {
        info!(dataset = kind.name(), "dataset already provisioned");
        return Ok(());
    }

    if !config.auto_fetch_datasets {
        return Err(DatasetError::MissingData {
            kind: kind.name(),
            missing: config.data_dir.join(&missing[0]),
        });
    }

    let download_dir = config.data_dir.join("download");
    for url in kind.archive_urls() {
        // Archives whose output already exists are left alone; only the
        // missing pieces are fetched and unpacked.
        if kind
            .archive_outputs(url)
            .iter()
            .all(|rel| config.data_dir.join(rel).exists())
        {
            continue;
        }

        let archive = download_dir.join(archive_filename(url));
        fetcher
            .fetch(url, &archive, config.fetch_attempts, cancel)
            .map_err(|e| DatasetError::Fetch {
                kind: kind.name(),
                source: e,
            })?;

        let dest = extraction_dir(kind, config, url);
        extract_archive(&archive, &dest, runner)?;
    }

    if kind == DatasetKind::Coastline {
        flatten_coastline(&config.data_dir.join("coastline"))?;
    }

    // A dataset that still misses files after extraction points at a
    // changed upstream archive layout.
    for rel in kind.expected_files() {
        let path = config.data_dir.join(&rel);
        if !path.exists() {
            return Err(DatasetError::MissingData {
                kind: kind.name(),
                missing: path,
            });
        }
    }

    info!(dataset = kind.name(), "dataset provisioned");
    Ok(())
}

fn archive_filename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn extraction_dir(kind: DatasetKind, config: &RunConfig, url: &str) -> PathBuf {
    match kind {
        DatasetKind::Coastline => config.data_dir.join("coastline"),
        DatasetKind::Landcover => config.data_dir.join("landcover").join(archive_stem(url)),
    }
}

/// Unpack `archive` into `dest` with the runner's unzip tool.
///
/// A locked archive (commonly held open briefly by a background
/// scanner) gets one more chance through a disposable temporary copy.
fn extract_archive(archive: &Path, dest: &Path, runner: &dyn CommandRunner) -> DatasetResult<()> {
    fs::create_dir_all(dest).map_err(|e| DatasetError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;

    match run_unzip(archive, dest, runner) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(
                archive = %archive.display(),
                error = %first,
                "extraction failed, retrying through a temporary copy"
            );

            let temp_copy = archive.with_extension("zip.tmp");
            fs::copy(archive, &temp_copy).map_err(|e| DatasetError::Io {
                path: temp_copy.clone(),
                source: e,
            })?;
            let result = run_unzip(&temp_copy, dest, runner);
            let _ = fs::remove_file(&temp_copy);
            result
        }
    }
}

fn run_unzip(archive: &Path, dest: &Path, runner: &dyn CommandRunner) -> DatasetResult<()> {
    let spec = CommandSpec::new(
        "unzip",
        vec![
            "-o".to_string(),
            runner.translate(archive),
            "-d".to_string(),
            runner.translate(dest),
        ],
    );
    runner.run(&spec).map_err(|e| DatasetError::Extract {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Copy every sibling sharing the coastline shapefile's stem up to the
/// dataset root, so `coastline/water_polygons.shp` exists no matter how
/// deep the archive nested it.
fn flatten_coastline(coastline_dir: &Path) -> DatasetResult<()> {
    let found = match find_file(coastline_dir, COASTLINE_SHAPEFILE) {
        Some(path) => path,
        None => return Ok(()), // reported as MissingData by the caller
    };

    let source_dir = match found.parent() {
        Some(dir) if dir != coastline_dir => dir.to_path_buf(),
        _ => return Ok(()), // already flat
    };

    let stem = found
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let entries = fs::read_dir(&source_dir).map_err(|e| DatasetError::Io {
        path: source_dir.clone(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::Io {
            path: source_dir.clone(),
            source: e,
        })?;
        let path = entry.path();
        let matches_stem = path
            .file_stem()
            .map(|s| s.to_string_lossy() == stem)
            .unwrap_or(false);
        if !matches_stem || !path.is_file() {
            continue;
        }

        let target = coastline_dir.join(entry.file_name());
        fs::copy(&path, &target).map_err(|e| DatasetError::Io {
            path: target.clone(),
            source: e,
        })?;
    }

    Ok(())
}

/// Depth-first search for a file by name.
fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && entry.file_name().to_string_lossy() == name {
            return Some(path);
        }
        if path.is_dir() {
            subdirs.push(path);
        }
    }

    subdirs.into_iter().find_map(|sub| find_file(&sub, name))
}
