//! End-to-end pipeline test against stand-in external tools.
//!
//! The renderer and converter are replaced by small shell scripts that
//! copy their input to their output and log each invocation, so the
//! whole pipeline runs for real (filesystem state machine, checksum
//! verification, stage skipping) without tilemaker or pmtiles installed.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use tilesmith::bridge::NativeRunner;
use tilesmith::cancel::CancelToken;
use tilesmith::config::{ConfigFile, RunConfig};
use tilesmith::fetch::{FetchError, Fetcher, HttpClient};
use tilesmith::integrity::file_sha256;
use tilesmith::pipeline::{Region, RegionPipeline};
use tilesmith::render::TemplateSource;

/// HTTP client that fails every request. The test pre-seeds all
/// artifacts, so any fetch attempt is a bug.
struct NoNetwork;

impl HttpClient for NoNetwork {
    fn fetch_to(&self, url: &str, _dest: &Path) -> Result<u64, FetchError> {
        Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: 599,
        })
    }
}

fn write_tool(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

/// Install fake renderer and converter scripts; invocations are logged
/// to `calls.log` in the same directory.
fn install_tools(bin_dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    fs::create_dir_all(bin_dir).unwrap();
    let calls = bin_dir.join("calls.log");

    // tilemaker-style: --input IN --output OUT --config C --process P ...
    let renderer = bin_dir.join("fake-renderer");
    write_tool(
        &renderer,
        &format!(
            "#!/bin/sh\necho \"render $4\" >> {}\ncp \"$2\" \"$4\"\n",
            calls.display()
        ),
    );

    // pmtiles-style: convert IN OUT
    let converter = bin_dir.join("fake-converter");
    write_tool(
        &converter,
        &format!(
            "#!/bin/sh\necho \"convert $3\" >> {}\ncp \"$2\" \"$3\"\n",
            calls.display()
        ),
    );

    (renderer, converter, calls)
}

fn provision_datasets(data_dir: &Path) {
    let coastline = data_dir.join("coastline");
    fs::create_dir_all(&coastline).unwrap();
    fs::write(coastline.join("water_polygons.shp"), b"shp").unwrap();

    for stem in [
        "ne_10m_urban_areas",
        "ne_10m_antarctic_ice_shelves_polys",
        "ne_10m_glaciated_areas",
    ] {
        let dir = data_dir.join("landcover").join(stem);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.shp", stem)), b"shp").unwrap();
    }
}

fn write_templates(dir: &Path) -> TemplateSource {
    fs::create_dir_all(dir).unwrap();
    let config_template = dir.join("config-template.json");
    let script_template = dir.join("process-template.lua");
    fs::write(
        &config_template,
        r#"{"layers":[{"name":"water","minzoom":0,"maxzoom":14}]}"#,
    )
    .unwrap();
    fs::write(&script_template, "-- processing\n".repeat(50)).unwrap();
    TemplateSource {
        config_template,
        script_template,
        bridge_config: None,
        bridge_script: None,
    }
}

fn seed_extract(region: &Region, output_dir: &Path) {
    fs::create_dir_all(output_dir).unwrap();
    let raw = region.raw_path(output_dir);
    fs::write(&raw, b"seeded osm extract bytes").unwrap();
    let hash = file_sha256(&raw).unwrap();
    fs::write(
        region.checksum_path(output_dir),
        format!("{}  {}\n", hash, region.raw_filename()),
    )
    .unwrap();
}

fn run_pipeline(config: &RunConfig, templates: TemplateSource, regions: &[Region]) {
    let fetcher = Fetcher::new(Box::new(NoNetwork));
    let runner = NativeRunner::new();
    let pipeline = RegionPipeline::new(config, templates, &fetcher, &runner, CancelToken::new());
    pipeline.run(regions).unwrap();
}

#[test]
fn seeded_build_runs_tools_and_resumes_without_rework() {
    let temp = TempDir::new().unwrap();
    let (renderer, converter, calls) = install_tools(&temp.path().join("bin"));

    let mut config = RunConfig::from_config_file(&ConfigFile::default()).unwrap();
    config.output_dir = temp.path().join("build");
    config.data_dir = temp.path().join("data");
    config.work_dir = config.output_dir.join("work");
    config.min_free_bytes = 0;
    config.renderer_cmd = renderer.to_string_lossy().into_owned();
    config.converter_cmd = converter.to_string_lossy().into_owned();

    provision_datasets(&config.data_dir);
    let templates = write_templates(&temp.path().join("templates"));

    let region = Region::new(
        "se_sweden",
        "Sweden",
        "https://example.com/se_sweden.osm.pbf",
    );
    seed_extract(&region, &config.output_dir);

    run_pipeline(&config, templates.clone(), std::slice::from_ref(&region));

    let converted = region.converted_path(&config.output_dir);
    assert!(converted.exists());
    assert_eq!(
        fs::read(&converted).unwrap(),
        b"seeded osm extract bytes",
        "converter should have received the renderer's copy of the extract"
    );

    let manifest_path = config.output_dir.join("manifest.json");
    let manifest = tilesmith::manifest::BuildManifest::load(&manifest_path).unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.regions[0].file, "se_sweden.pmtiles");
    assert_eq!(
        manifest.regions[0].size_bytes,
        fs::metadata(&converted).unwrap().len()
    );

    // One render plus one convert.
    let log = fs::read_to_string(&calls).unwrap();
    assert_eq!(log.lines().count(), 2);

    // Re-run: every artifact exists, so no tool runs again and the
    // manifest is rewritten with the same content.
    run_pipeline(&config, templates, std::slice::from_ref(&region));

    let log = fs::read_to_string(&calls).unwrap();
    assert_eq!(log.lines().count(), 2, "resume must not re-run stages");
    assert!(manifest_path.exists());
}

#[test]
fn failing_renderer_aborts_without_manifest() {
    let temp = TempDir::new().unwrap();
    let bin_dir = temp.path().join("bin");
    fs::create_dir_all(&bin_dir).unwrap();
    let renderer = bin_dir.join("fake-renderer");
    write_tool(&renderer, "#!/bin/sh\nexit 7\n");

    let mut config = RunConfig::from_config_file(&ConfigFile::default()).unwrap();
    config.output_dir = temp.path().join("build");
    config.data_dir = temp.path().join("data");
    config.work_dir = config.output_dir.join("work");
    config.min_free_bytes = 0;
    config.renderer_cmd = renderer.to_string_lossy().into_owned();

    provision_datasets(&config.data_dir);
    let templates = write_templates(&temp.path().join("templates"));

    let region = Region::new(
        "no_norway",
        "Norway",
        "https://example.com/no_norway.osm.pbf",
    );
    seed_extract(&region, &config.output_dir);

    let fetcher = Fetcher::new(Box::new(NoNetwork));
    let runner = NativeRunner::new();
    let pipeline = RegionPipeline::new(&config, templates, &fetcher, &runner, CancelToken::new());
    let err = pipeline.run(std::slice::from_ref(&region)).unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("render"), "unexpected error: {}", msg);
    assert!(msg.contains("7"), "exit code should be reported: {}", msg);
    assert!(!config.output_dir.join("manifest.json").exists());
}
