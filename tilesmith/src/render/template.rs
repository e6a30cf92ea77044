//! Template resolution and config materialization.
//!
//! The materialized configuration lives in the working directory next to
//! a fingerprint sidecar. The fingerprint is the SHA-256 of the source
//! template text plus the zoom window it was clamped to, so staleness is
//! an exact comparison rather than a guess from file contents. A config
//! whose fingerprint matches is reused verbatim; anything else is
//! re-derived from the template.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::config::RenderConfig;
use super::error::{RenderConfigError, RenderConfigResult};
use crate::bridge::CommandRunner;

/// Filename of the materialized layer configuration.
pub const CONFIG_FILENAME: &str = "render-config.json";

/// Filename of the materialized processing script.
pub const SCRIPT_FILENAME: &str = "process.lua";

/// Fingerprint sidecar recording what the materialized files derive from.
const FINGERPRINT_FILENAME: &str = "render-config.src.sha256";

/// A processing script below this line count cannot be a real template;
/// it is treated as a stub left behind by a mismatched renderer install.
pub const MIN_SCRIPT_LINES: usize = 40;

/// Where the templates come from.
#[derive(Clone, Debug)]
pub struct TemplateSource {
    /// Bundled layer-configuration template (JSON).
    pub config_template: PathBuf,

    /// Bundled processing-script template.
    pub script_template: PathBuf,

    /// Bridge-side path of the configuration template, used when the
    /// bundled copy is unusable.
    pub bridge_config: Option<String>,

    /// Bridge-side path of the processing script.
    pub bridge_script: Option<String>,
}

/// Paths of the materialized configuration files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterializedConfig {
    pub config_path: PathBuf,
    pub script_path: PathBuf,
}

/// Materialize the renderer configuration into `work_dir`.
///
/// Resolution order:
/// 1. Reuse the previously materialized config when its fingerprint
///    sidecar matches the current template and zoom window.
/// 2. When the bundled processing script is unusable (missing or
///    stub-length), fetch both templates from the bridge environment.
/// 3. Otherwise use the bundled templates.
///
/// When no template resolves at all, a complete previously
/// materialized set (config, script, fingerprint) is reused as-is.
///
/// All text is normalized to `\n` line endings before persisting, since
/// templates may originate from either execution environment.
pub fn materialize(
    source: &TemplateSource,
    work_dir: &Path,
    min_zoom: u8,
    max_zoom: u8,
    runner: &dyn CommandRunner,
) -> RenderConfigResult<MaterializedConfig> {
    fs::create_dir_all(work_dir).map_err(|e| RenderConfigError::Io {
        path: work_dir.to_path_buf(),
        source: e,
    })?;

    let materialized = MaterializedConfig {
        config_path: work_dir.join(CONFIG_FILENAME),
        script_path: work_dir.join(SCRIPT_FILENAME),
    };
    let fingerprint_path = work_dir.join(FINGERPRINT_FILENAME);

    // When no template can be resolved at all, a complete previously
    // materialized config is still good: its fingerprint proves what it
    // was derived from, and without a template there is nothing newer
    // to compare against.
    let (config_text, script_text) = match resolve_templates(source, runner) {
        Ok(texts) => texts,
        Err(e) if is_complete(&materialized, &fingerprint_path) => {
            warn!(
                config = %materialized.config_path.display(),
                error = %e,
                "templates unavailable, reusing previously materialized render config"
            );
            return Ok(materialized);
        }
        Err(e) => return Err(e),
    };
    let fingerprint = fingerprint(&config_text, &script_text, min_zoom, max_zoom);

    if can_reuse(&materialized, &fingerprint_path, &fingerprint) {
        info!(config = %materialized.config_path.display(), "reusing materialized render config");
        return Ok(materialized);
    }

    let mut config = RenderConfig::parse(&config_text).map_err(|e| {
        RenderConfigError::TemplateParse {
            path: source.config_template.clone(),
            reason: e.to_string(),
        }
    })?;
    config.clamp_zoom(min_zoom, max_zoom);

    write_file(&materialized.config_path, &config.to_json_pretty())?;
    write_file(&materialized.script_path, &script_text)?;
    write_file(&fingerprint_path, &format!("{}\n", fingerprint))?;

    info!(
        config = %materialized.config_path.display(),
        min_zoom,
        max_zoom,
        "materialized render config"
    );
    Ok(materialized)
}

/// Resolve the template texts, falling back to the bridge when the
/// bundled script is unusable.
fn resolve_templates(
    source: &TemplateSource,
    runner: &dyn CommandRunner,
) -> RenderConfigResult<(String, String)> {
    match read_normalized(&source.script_template) {
        Ok(script) if script_usable(&script) => {
            let config = read_normalized(&source.config_template).map_err(|_| {
                RenderConfigError::TemplateMissing(source.config_template.clone())
            })?;
            Ok((config, script))
        }
        bundled => {
            let lines = match &bundled {
                Ok(script) => script.lines().count(),
                Err(_) => 0,
            };
            warn!(
                script = %source.script_template.display(),
                lines,
                "bundled processing script unusable, trying bridge templates"
            );
            fetch_bridge_templates(source, runner, lines)
        }
    }
}

fn fetch_bridge_templates(
    source: &TemplateSource,
    runner: &dyn CommandRunner,
    bundled_lines: usize,
) -> RenderConfigResult<(String, String)> {
    let (bridge_config, bridge_script) = match (&source.bridge_config, &source.bridge_script) {
        (Some(config), Some(script)) => (config, script),
        _ => {
            return Err(RenderConfigError::TemplateUnusable {
                path: source.script_template.clone(),
                lines: bundled_lines,
            })
        }
    };

    let config = bridge_cat(runner, bridge_config)?;
    let script = bridge_cat(runner, bridge_script)?;

    if !script_usable(&script) {
        return Err(RenderConfigError::BridgeFetch {
            reason: format!(
                "bridge script {} has only {} lines",
                bridge_script,
                script.lines().count()
            ),
        });
    }

    Ok((normalize_newlines(&config), normalize_newlines(&script)))
}

fn bridge_cat(runner: &dyn CommandRunner, path: &str) -> RenderConfigResult<String> {
    debug!(path, runner = runner.name(), "fetching template");
    let spec = crate::bridge::CommandSpec::new("cat", vec![path.to_string()]);
    runner
        .run_capture(&spec)
        .map_err(|e| RenderConfigError::BridgeFetch {
            reason: e.to_string(),
        })
}

fn script_usable(script: &str) -> bool {
    script.lines().count() > MIN_SCRIPT_LINES
}

/// Whether a full set of materialized files (config, script,
/// fingerprint sidecar) is present.
fn is_complete(materialized: &MaterializedConfig, fingerprint_path: &Path) -> bool {
    materialized.config_path.exists()
        && materialized.script_path.exists()
        && fingerprint_path.exists()
}

fn can_reuse(materialized: &MaterializedConfig, fingerprint_path: &Path, want: &str) -> bool {
    if !materialized.config_path.exists() || !materialized.script_path.exists() {
        return false;
    }
    let recorded = match fs::read_to_string(fingerprint_path) {
        Ok(text) => text.trim().to_string(),
        Err(_) => return false,
    };
    recorded == want
}

fn fingerprint(config_text: &str, script_text: &str, min_zoom: u8, max_zoom: u8) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config_text.as_bytes());
    hasher.update(script_text.as_bytes());
    hasher.update([min_zoom, max_zoom]);
    format!("{:x}", hasher.finalize())
}

fn read_normalized(path: &Path) -> std::io::Result<String> {
    fs::read_to_string(path).map(|text| normalize_newlines(&text))
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn write_file(path: &Path, content: &str) -> RenderConfigResult<()> {
    fs::write(path, content).map_err(|e| RenderConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::RecordingRunner;
    use tempfile::TempDir;

    const CONFIG_TEMPLATE: &str = r#"{
        "layers": [
            { "name": "water", "minzoom": 0, "maxzoom": 14 }
        ]
    }"#;

    fn usable_script() -> String {
        let mut script = String::from("-- processing script\n");
        for i in 0..MIN_SCRIPT_LINES + 10 {
            script.push_str(&format!("function layer_{}() end\n", i));
        }
        script
    }

    fn bundled_source(temp: &TempDir) -> TemplateSource {
        let config_template = temp.path().join("config-template.json");
        let script_template = temp.path().join("process-template.lua");
        fs::write(&config_template, CONFIG_TEMPLATE).unwrap();
        fs::write(&script_template, usable_script()).unwrap();
        TemplateSource {
            config_template,
            script_template,
            bridge_config: None,
            bridge_script: None,
        }
    }

    #[test]
    fn test_materialize_from_bundled_templates() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let source = bundled_source(&temp);
        let runner = RecordingRunner::new();

        let result = materialize(&source, &work, 2, 10, &runner).unwrap();

        assert!(result.config_path.exists());
        assert!(result.script_path.exists());
        assert_eq!(runner.run_count(), 0);

        let config =
            RenderConfig::parse(&fs::read_to_string(&result.config_path).unwrap()).unwrap();
        assert_eq!(config.layer_zooms(), vec![(Some(2), Some(10))]);
    }

    #[test]
    fn test_materialize_reuses_matching_fingerprint() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let source = bundled_source(&temp);
        let runner = RecordingRunner::new();

        materialize(&source, &work, 2, 10, &runner).unwrap();
        let config_path = work.join(CONFIG_FILENAME);
        let written = fs::read_to_string(&config_path).unwrap();

        materialize(&source, &work, 2, 10, &runner).unwrap();
        assert_eq!(fs::read_to_string(&config_path).unwrap(), written);
    }

    #[test]
    fn test_materialize_reuses_when_templates_removed() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let source = bundled_source(&temp);
        let runner = RecordingRunner::new();

        let first = materialize(&source, &work, 2, 10, &runner).unwrap();
        let written = fs::read_to_string(&first.config_path).unwrap();

        // Templates gone after the first run; the materialized config
        // and its fingerprint are still a complete, reusable set.
        fs::remove_file(&source.config_template).unwrap();
        fs::remove_file(&source.script_template).unwrap();

        let second = materialize(&source, &work, 2, 10, &runner).unwrap();
        assert_eq!(second, first);
        assert_eq!(fs::read_to_string(&second.config_path).unwrap(), written);
        assert_eq!(runner.run_count(), 0);
    }

    #[test]
    fn test_materialize_regenerates_on_zoom_change() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let source = bundled_source(&temp);
        let runner = RecordingRunner::new();

        materialize(&source, &work, 2, 10, &runner).unwrap();
        materialize(&source, &work, 0, 14, &runner).unwrap();

        let config =
            RenderConfig::parse(&fs::read_to_string(work.join(CONFIG_FILENAME)).unwrap()).unwrap();
        assert_eq!(config.layer_zooms(), vec![(Some(0), Some(14))]);
    }

    #[test]
    fn test_materialize_regenerates_on_template_change() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let source = bundled_source(&temp);
        let runner = RecordingRunner::new();

        materialize(&source, &work, 2, 10, &runner).unwrap();

        let altered = CONFIG_TEMPLATE.replace("water", "ocean");
        fs::write(&source.config_template, altered).unwrap();
        materialize(&source, &work, 2, 10, &runner).unwrap();

        let text = fs::read_to_string(work.join(CONFIG_FILENAME)).unwrap();
        assert!(text.contains("ocean"));
    }

    #[test]
    fn test_materialize_normalizes_line_endings() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let source = bundled_source(&temp);
        fs::write(&source.script_template, usable_script().replace('\n', "\r\n")).unwrap();
        let runner = RecordingRunner::new();

        let result = materialize(&source, &work, 0, 14, &runner).unwrap();

        let script = fs::read_to_string(&result.script_path).unwrap();
        assert!(!script.contains('\r'));
    }

    #[test]
    fn test_stub_script_falls_back_to_bridge() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let mut source = bundled_source(&temp);
        fs::write(&source.script_template, "-- stub\n").unwrap();
        source.bridge_config = Some("/usr/share/renderer/config.json".to_string());
        source.bridge_script = Some("/usr/share/renderer/process.lua".to_string());

        // run_capture serves the same text for both fetches; pad a JSON
        // document with blank lines so it also passes the script length check
        let mut bridge_text = String::from("{ \"layers\": [] }");
        for _ in 0..MIN_SCRIPT_LINES + 5 {
            bridge_text.push('\n');
        }
        let runner = RecordingRunner::new().with_capture_output(bridge_text);

        materialize(&source, &work, 0, 14, &runner).unwrap();
        assert_eq!(runner.run_count(), 2);
    }

    #[test]
    fn test_stub_script_without_bridge_is_an_error() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let source = bundled_source(&temp);
        fs::write(&source.script_template, "-- stub\n").unwrap();
        let runner = RecordingRunner::new();

        let err = materialize(&source, &work, 0, 14, &runner).unwrap_err();
        assert!(matches!(err, RenderConfigError::TemplateUnusable { .. }));
    }

    #[test]
    fn test_missing_config_template_is_an_error() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let mut source = bundled_source(&temp);
        fs::remove_file(&source.config_template).unwrap();
        source.bridge_config = None;
        let runner = RecordingRunner::new();

        let err = materialize(&source, &work, 0, 14, &runner).unwrap_err();
        assert!(matches!(err, RenderConfigError::TemplateMissing(_)));
    }
}
