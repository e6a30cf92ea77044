//! The build pipeline driver.
//!
//! Each region advances through a fixed sequence of stages, with the
//! filesystem as the only state store: the presence of an artifact marks
//! its stage complete. Re-running after an interruption re-derives the
//! position from what is on disk and skips finished work, so every stage
//! must be idempotent.
//!
//! Stage order per region: acquire raw extract, verify checksum, render,
//! convert, record in the manifest. Regions are processed strictly one
//! at a time; the first fatal error stops the run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bridge::CommandRunner;
use crate::cancel::CancelToken;
use crate::config::{format_size, RunConfig};
use crate::datasets::{self, DatasetKind};
use crate::fetch::{FetchError, Fetcher};
use crate::integrity;
use crate::manifest::{BuildManifest, ManifestEntry};
use crate::render::{self, MaterializedConfig, TemplateSource};
use crate::stage::StageRunner;

pub mod error;
pub mod region;

pub use error::{BuildError, BuildResult};
pub use region::{builtin_regions, load_regions_file, Region};

/// Manifest filename, written into the output directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Drives the full build for a list of regions.
pub struct RegionPipeline<'a> {
    config: &'a RunConfig,
    templates: TemplateSource,
    fetcher: &'a Fetcher,
    runner: &'a dyn CommandRunner,
    cancel: CancelToken,
}

impl<'a> RegionPipeline<'a> {
    pub fn new(
        config: &'a RunConfig,
        templates: TemplateSource,
        fetcher: &'a Fetcher,
        runner: &'a dyn CommandRunner,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            templates,
            fetcher,
            runner,
            cancel,
        }
    }

    /// Run the pipeline for `regions`, in order.
    ///
    /// On success every region's converted archive exists and the
    /// manifest has been written. The manifest is written exactly once,
    /// after the last region; an aborted run leaves the previous
    /// manifest untouched.
    pub fn run(&self, regions: &[Region]) -> BuildResult<BuildManifest> {
        self.config.validate()?;

        fs::create_dir_all(&self.config.output_dir).map_err(|e| BuildError::Io {
            path: self.config.output_dir.clone(),
            source: e,
        })?;
        self.preflight_disk()?;

        self.check_cancelled()?;
        datasets::ensure(
            DatasetKind::Coastline,
            self.config,
            self.fetcher,
            self.runner,
            &self.cancel,
        )?;
        datasets::ensure(
            DatasetKind::Landcover,
            self.config,
            self.fetcher,
            self.runner,
            &self.cancel,
        )?;

        self.check_cancelled()?;
        let materialized = render::materialize(
            &self.templates,
            &self.config.work_dir,
            self.config.min_zoom,
            self.config.max_zoom,
            self.runner,
        )?;

        let store_dir = self.config.work_dir.join("store");
        fs::create_dir_all(&store_dir).map_err(|e| BuildError::Io {
            path: store_dir.clone(),
            source: e,
        })?;

        let stages = StageRunner::new(self.config, self.runner);
        let mut manifest = BuildManifest::new(self.config.min_zoom, self.config.max_zoom);

        for region in regions {
            self.check_cancelled()?;
            info!(region = %region.slug, "building region");
            self.build_region(region, &stages, &materialized, &store_dir, &mut manifest)?;
        }

        let manifest_path = self.config.output_dir.join(MANIFEST_FILENAME);
        manifest
            .write(&manifest_path)
            .map_err(|e| BuildError::ManifestWrite {
                path: manifest_path.clone(),
                source: e,
            })?;
        info!(
            manifest = %manifest_path.display(),
            regions = manifest.len(),
            "build complete"
        );
        Ok(manifest)
    }

    fn build_region(
        &self,
        region: &Region,
        stages: &StageRunner<'_>,
        materialized: &MaterializedConfig,
        store_dir: &Path,
        manifest: &mut BuildManifest,
    ) -> BuildResult<()> {
        let out = &self.config.output_dir;
        let raw = region.raw_path(out);
        let rendered = region.rendered_path(out);
        let converted = region.converted_path(out);

        self.acquire_raw(region, &raw)?;

        self.check_cancelled()?;
        stages.run_render(&region.slug, &raw, &rendered, materialized, store_dir)?;

        self.check_cancelled()?;
        stages.run_convert(&region.slug, &rendered, &converted)?;

        if self.config.remove_rendered {
            if let Err(e) = fs::remove_file(&rendered) {
                warn!(path = %rendered.display(), error = %e, "could not remove rendered archive");
            }
        }

        let size_bytes = fs::metadata(&converted)
            .map_err(|e| BuildError::Io {
                path: converted.clone(),
                source: e,
            })?
            .len();
        manifest.push(ManifestEntry {
            name: region.slug.clone(),
            file: region.converted_filename(),
            size_bytes,
            url: publish_url(&self.config.publish_url_prefix, &region.converted_filename()),
        });
        info!(
            region = %region.slug,
            size = %format_size(size_bytes),
            "region complete"
        );
        Ok(())
    }

    /// Make sure a verified raw extract exists for `region`.
    ///
    /// With verification enabled the checksum sidecar is fetched first
    /// (a no-op when present). A pre-existing extract that fails
    /// verification is treated as stale, not fatal: both artifact and
    /// sidecar are discarded and re-fetched once. Only a mismatch on a
    /// fresh download is fatal.
    fn acquire_raw(&self, region: &Region, raw: &Path) -> BuildResult<()> {
        if !self.config.verify_checksums {
            if raw.exists() {
                debug!(region = %region.slug, "extract present, verification disabled");
                return Ok(());
            }
            return self.fetch_for(region, &region.url, raw);
        }

        let sidecar = region.checksum_path(&self.config.output_dir);
        self.fetch_for(region, &region.checksum_url(), &sidecar)?;

        if raw.exists() {
            if integrity::verify(raw, &sidecar) {
                info!(region = %region.slug, "existing extract verified, reusing");
                return Ok(());
            }
            warn!(
                region = %region.slug,
                artifact = %raw.display(),
                "existing extract failed verification, re-fetching"
            );
            discard(raw)?;
            discard(&sidecar)?;
            self.fetch_for(region, &region.checksum_url(), &sidecar)?;
        }

        self.fetch_for(region, &region.url, raw)?;

        if !integrity::verify(raw, &sidecar) {
            return Err(BuildError::Integrity {
                region: region.slug.clone(),
                artifact: raw.to_path_buf(),
            });
        }
        Ok(())
    }

    fn fetch_for(&self, region: &Region, url: &str, dest: &Path) -> BuildResult<()> {
        self.fetcher
            .fetch(url, dest, self.config.fetch_attempts, &self.cancel)
            .map_err(|e| match e {
                FetchError::Cancelled => BuildError::Cancelled,
                other => BuildError::Fetch {
                    region: region.slug.clone(),
                    source: other,
                },
            })
    }

    fn preflight_disk(&self) -> BuildResult<()> {
        if self.config.min_free_bytes == 0 {
            return Ok(());
        }
        let available =
            fs2::available_space(&self.config.output_dir).map_err(|e| BuildError::Io {
                path: self.config.output_dir.clone(),
                source: e,
            })?;
        debug!(
            available = %format_size(available),
            required = %format_size(self.config.min_free_bytes),
            "disk preflight"
        );
        if available < self.config.min_free_bytes {
            return Err(BuildError::InsufficientDisk {
                available,
                required: self.config.min_free_bytes,
            });
        }
        Ok(())
    }

    fn check_cancelled(&self) -> BuildResult<()> {
        if self.cancel.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Remove a stale artifact, renaming it aside when deletion is blocked.
///
/// A background scanner can hold the file locked; renaming within the
/// same directory usually still succeeds and gets it out of the
/// pipeline's way.
fn discard(path: &Path) -> BuildResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(remove_err) => {
            let aside = stale_path(path);
            warn!(
                path = %path.display(),
                error = %remove_err,
                aside = %aside.display(),
                "could not delete stale file, renaming aside"
            );
            fs::rename(path, &aside).map_err(|e| BuildError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}

fn stale_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".stale");
    path.with_file_name(name)
}

fn publish_url(prefix: &str, file: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), file)
    }
}
