//! The `build` subcommand: run the full pipeline.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use tilesmith::bridge::{BridgedRunner, CommandRunner, NativeRunner};
use tilesmith::cancel::CancelToken;
use tilesmith::config::{config_directory, format_size, ConfigFile, ExecMode, RunConfig};
use tilesmith::fetch::{CurlTransport, Fetcher, ReqwestClient};
use tilesmith::logging;
use tilesmith::pipeline::{builtin_regions, load_regions_file, Region, RegionPipeline};
use tilesmith::render::{TemplateSource, CONFIG_FILENAME, SCRIPT_FILENAME};

use crate::error::CliError;

/// Bridge-side template locations used when the bundled processing
/// script is unusable (standard tilemaker install paths).
const BRIDGE_CONFIG_TEMPLATE: &str = "/usr/share/tilemaker/config-openmaptiles.json";
const BRIDGE_SCRIPT_TEMPLATE: &str = "/usr/share/tilemaker/process-openmaptiles.lua";

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Region definition file (JSON array of slug/name/url objects);
    /// defaults to the built-in Nordic region set
    #[arg(long)]
    pub regions: Option<PathBuf>,

    /// Build only the named region slugs (repeatable)
    #[arg(long = "region")]
    pub only: Vec<String>,

    /// Override the configured minimum zoom
    #[arg(long)]
    pub min_zoom: Option<u8>,

    /// Override the configured maximum zoom
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Override the configured output directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Override the configured dataset directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Skip checksum verification of raw extracts
    #[arg(long)]
    pub no_verify: bool,

    /// Delete intermediate rendered archives after conversion
    #[arg(long)]
    pub remove_rendered: bool,

    /// Skip the free-disk-space preflight
    #[arg(long)]
    pub no_disk_check: bool,
}

pub fn run(args: BuildArgs) -> Result<(), CliError> {
    let file = ConfigFile::load().unwrap_or_default();
    let mut config = RunConfig::from_config_file(&file)?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let _guard = logging::init(&config.output_dir)?;

    let regions = select_regions(&args)?;
    info!(regions = regions.len(), "starting build");

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping after the current step...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("could not install interrupt handler: {}", e)))?;

    let client = ReqwestClient::new()
        .map_err(|e| CliError::Config(format!("could not build HTTP client: {}", e)))?;
    let fetcher = Fetcher::new(Box::new(client)).with_fallback(Box::new(CurlTransport::new()));

    let runner: Box<dyn CommandRunner> = match config.exec_mode {
        ExecMode::Native => Box::new(NativeRunner::new()),
        ExecMode::Bridged => Box::new(BridgedRunner::new(config.bridge_target.clone())),
    };

    let templates = template_source(&config);
    let pipeline = RegionPipeline::new(&config, templates, &fetcher, runner.as_ref(), cancel);
    let manifest = pipeline.run(&regions)?;

    println!();
    println!("Build complete: {} region(s)", manifest.len());
    let mut total = 0u64;
    for entry in &manifest.regions {
        println!("  {:<24} {:>10}", entry.file, format_size(entry.size_bytes));
        total += entry.size_bytes;
    }
    println!("  {:<24} {:>10}", "total", format_size(total));
    Ok(())
}

fn apply_overrides(config: &mut RunConfig, args: &BuildArgs) {
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
        config.work_dir = dir.join("work");
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(z) = args.min_zoom {
        config.min_zoom = z;
    }
    if let Some(z) = args.max_zoom {
        config.max_zoom = z;
    }
    if args.no_verify {
        config.verify_checksums = false;
    }
    if args.remove_rendered {
        config.remove_rendered = true;
    }
    if args.no_disk_check {
        config.min_free_bytes = 0;
    }
}

fn select_regions(args: &BuildArgs) -> Result<Vec<Region>, CliError> {
    let all = match &args.regions {
        Some(path) => load_regions_file(path)?,
        None => builtin_regions(),
    };

    if args.only.is_empty() {
        return Ok(all);
    }

    let mut selected = Vec::new();
    for slug in &args.only {
        match all.iter().find(|r| &r.slug == slug) {
            Some(region) => selected.push(region.clone()),
            None => {
                return Err(CliError::Config(format!(
                    "unknown region '{}'; use 'tilesmith regions' to list available slugs",
                    slug
                )))
            }
        }
    }
    Ok(selected)
}

/// Bundled templates live next to the config file; bridge-side copies
/// are only consulted in bridged mode.
fn template_source(config: &RunConfig) -> TemplateSource {
    let template_dir = config_directory().join("templates");
    let bridged = config.exec_mode == ExecMode::Bridged;
    TemplateSource {
        config_template: template_dir.join(CONFIG_FILENAME),
        script_template: template_dir.join(SCRIPT_FILENAME),
        bridge_config: bridged.then(|| BRIDGE_CONFIG_TEMPLATE.to_string()),
        bridge_script: bridged.then(|| BRIDGE_SCRIPT_TEMPLATE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn default_args() -> BuildArgs {
        BuildArgs {
            regions: None,
            only: vec![],
            min_zoom: None,
            max_zoom: None,
            output_dir: None,
            data_dir: None,
            no_verify: false,
            remove_rendered: false,
            no_disk_check: false,
        }
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = RunConfig::from_config_file(&ConfigFile::default()).unwrap();
        let mut args = default_args();
        args.output_dir = Some(PathBuf::from("/srv/tiles"));
        args.max_zoom = Some(12);
        args.no_verify = true;
        args.no_disk_check = true;

        apply_overrides(&mut config, &args);

        assert_eq!(config.output_dir, PathBuf::from("/srv/tiles"));
        assert_eq!(config.work_dir, PathBuf::from("/srv/tiles/work"));
        assert_eq!(config.max_zoom, 12);
        assert!(!config.verify_checksums);
        assert_eq!(config.min_free_bytes, 0);
    }

    #[test]
    fn test_select_builtin_regions() {
        let regions = select_regions(&default_args()).unwrap();
        assert!(regions.iter().any(|r| r.slug == "se_sweden"));
    }

    #[test]
    fn test_select_filters_by_slug() {
        let mut args = default_args();
        args.only = vec!["no_norway".to_string()];

        let regions = select_regions(&args).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].slug, "no_norway");
    }

    #[test]
    fn test_select_unknown_slug_is_error() {
        let mut args = default_args();
        args.only = vec!["atlantis".to_string()];

        let err = select_regions(&args).unwrap_err();
        assert!(err.to_string().contains("atlantis"));
    }

    #[test]
    fn test_select_from_region_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("regions.json");
        fs::write(
            &path,
            r#"[{"slug":"is_iceland","name":"Iceland","url":"https://example.com/is.osm.pbf"}]"#,
        )
        .unwrap();

        let mut args = default_args();
        args.regions = Some(path);

        let regions = select_regions(&args).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].slug, "is_iceland");
    }

    #[test]
    fn test_bridge_templates_only_in_bridged_mode() {
        let mut config = RunConfig::from_config_file(&ConfigFile::default()).unwrap();
        assert!(template_source(&config).bridge_script.is_none());

        config.exec_mode = ExecMode::Bridged;
        let source = template_source(&config);
        assert_eq!(
            source.bridge_script.as_deref(),
            Some(BRIDGE_SCRIPT_TEMPLATE)
        );
    }
}
