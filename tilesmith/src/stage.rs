//! Render and convert stage execution.
//!
//! Both stages are expensive, deterministic external tools: a failure is
//! fatal and reported, never retried automatically. A stage whose output
//! artifact already exists is skipped, which is what makes interrupted
//! runs resumable.

use std::fmt;
use std::path::Path;

use tracing::info;

use crate::bridge::{CommandError, CommandRunner, CommandSpec};
use crate::config::RunConfig;
use crate::render::MaterializedConfig;

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Pipeline stage names for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Render,
    Convert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Render => write!(f, "render"),
            Stage::Convert => write!(f, "convert"),
        }
    }
}

/// Errors from running an external stage tool.
#[derive(Debug)]
pub enum StageError {
    /// The tool could not be started.
    Launch {
        stage: Stage,
        program: String,
        reason: String,
    },

    /// The tool ran and exited non-zero.
    Failed {
        region: String,
        stage: Stage,
        code: i32,
    },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Launch {
                stage,
                program,
                reason,
            } => {
                write!(f, "could not launch {} tool '{}': {}", stage, program, reason)
            }
            StageError::Failed {
                region,
                stage,
                code,
            } => {
                write!(
                    f,
                    "{} stage failed for region '{}' with exit code {}",
                    stage, region, code
                )
            }
        }
    }
}

impl std::error::Error for StageError {}

/// Invokes the external renderer and converter.
pub struct StageRunner<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> StageRunner<'a> {
    pub fn new(config: &'a RunConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Render a raw extract into a tiled archive.
    ///
    /// The renderer runs with the working directory set to the config's
    /// work dir, so the materialized config and script are referenced by
    /// bare filename on both sides of the bridge.
    pub fn run_render(
        &self,
        region: &str,
        input: &Path,
        output: &Path,
        materialized: &MaterializedConfig,
        store_dir: &Path,
    ) -> StageResult<()> {
        if output.exists() {
            info!(region, output = %output.display(), "rendered archive exists, skipping render");
            return Ok(());
        }

        let args = vec![
            "--input".to_string(),
            self.runner.translate(input),
            "--output".to_string(),
            self.runner.translate(output),
            "--config".to_string(),
            file_name(&materialized.config_path),
            "--process".to_string(),
            file_name(&materialized.script_path),
            "--store".to_string(),
            self.runner.translate(store_dir),
            "--threads".to_string(),
            "0".to_string(),
        ];
        let spec = CommandSpec::new(self.config.renderer_cmd.clone(), args)
            .with_cwd(self.config.work_dir.clone());

        info!(region, mode = self.runner.name(), "rendering");
        self.run_stage(region, Stage::Render, &spec)
    }

    /// Convert a rendered archive into the distributable format.
    pub fn run_convert(&self, region: &str, input: &Path, output: &Path) -> StageResult<()> {
        if output.exists() {
            info!(region, output = %output.display(), "converted archive exists, skipping convert");
            return Ok(());
        }

        let args = vec![
            "convert".to_string(),
            self.runner.translate(input),
            self.runner.translate(output),
        ];
        let spec = CommandSpec::new(self.config.converter_cmd.clone(), args);

        info!(region, mode = self.runner.name(), "converting");
        self.run_stage(region, Stage::Convert, &spec)
    }

    fn run_stage(&self, region: &str, stage: Stage, spec: &CommandSpec) -> StageResult<()> {
        match self.runner.run(spec) {
            Ok(()) => Ok(()),
            Err(CommandError::ExitStatus { code, .. }) => Err(StageError::Failed {
                region: region.to_string(),
                stage,
                code,
            }),
            Err(CommandError::Terminated { .. }) => Err(StageError::Failed {
                region: region.to_string(),
                stage,
                code: -1,
            }),
            Err(CommandError::Spawn { program, source }) => Err(StageError::Launch {
                stage,
                program,
                reason: source.to_string(),
            }),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::RecordingRunner;
    use crate::config::{ConfigFile, RunConfig};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_setup(temp: &TempDir) -> (RunConfig, MaterializedConfig) {
        let mut config = RunConfig::from_config_file(&ConfigFile::default()).unwrap();
        config.output_dir = temp.path().join("build");
        config.work_dir = temp.path().join("work");
        fs::create_dir_all(&config.work_dir).unwrap();

        let materialized = MaterializedConfig {
            config_path: config.work_dir.join("render-config.json"),
            script_path: config.work_dir.join("process.lua"),
        };
        (config, materialized)
    }

    #[test]
    fn test_render_builds_expected_invocation() {
        let temp = TempDir::new().unwrap();
        let (config, materialized) = test_setup(&temp);
        let runner = RecordingRunner::new();
        let stage = StageRunner::new(&config, &runner);

        let input = temp.path().join("se_sweden.osm.pbf");
        let output = temp.path().join("se_sweden.mbtiles");
        let store = temp.path().join("store");

        stage
            .run_render("se_sweden", &input, &output, &materialized, &store)
            .unwrap();

        let runs = runner.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        let spec = &runs[0];
        assert_eq!(spec.program, "tilemaker");
        assert_eq!(spec.cwd, Some(config.work_dir.clone()));

        // Config and script are referenced by bare filename relative to
        // the working directory
        let config_pos = spec.args.iter().position(|a| a == "--config").unwrap();
        assert_eq!(spec.args[config_pos + 1], "render-config.json");
        let process_pos = spec.args.iter().position(|a| a == "--process").unwrap();
        assert_eq!(spec.args[process_pos + 1], "process.lua");

        let threads_pos = spec.args.iter().position(|a| a == "--threads").unwrap();
        assert_eq!(spec.args[threads_pos + 1], "0");
    }

    #[test]
    fn test_render_skips_when_output_exists() {
        let temp = TempDir::new().unwrap();
        let (config, materialized) = test_setup(&temp);
        let runner = RecordingRunner::new();
        let stage = StageRunner::new(&config, &runner);

        let output = temp.path().join("se_sweden.mbtiles");
        fs::write(&output, b"already rendered").unwrap();

        stage
            .run_render(
                "se_sweden",
                &temp.path().join("in.osm.pbf"),
                &output,
                &materialized,
                &temp.path().join("store"),
            )
            .unwrap();

        assert_eq!(runner.run_count(), 0);
    }

    #[test]
    fn test_convert_builds_expected_invocation() {
        let temp = TempDir::new().unwrap();
        let (config, _) = test_setup(&temp);
        let runner = RecordingRunner::new();
        let stage = StageRunner::new(&config, &runner);

        let input = temp.path().join("se_sweden.mbtiles");
        let output = temp.path().join("se_sweden.pmtiles");
        stage.run_convert("se_sweden", &input, &output).unwrap();

        let runs = runner.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].program, "pmtiles");
        assert_eq!(runs[0].args[0], "convert");
        assert!(runs[0].args[1].ends_with("se_sweden.mbtiles"));
        assert!(runs[0].args[2].ends_with("se_sweden.pmtiles"));
    }

    #[test]
    fn test_convert_skips_when_output_exists() {
        let temp = TempDir::new().unwrap();
        let (config, _) = test_setup(&temp);
        let runner = RecordingRunner::new();
        let stage = StageRunner::new(&config, &runner);

        let output = temp.path().join("se_sweden.pmtiles");
        fs::write(&output, b"done").unwrap();

        stage
            .run_convert("se_sweden", &temp.path().join("in.mbtiles"), &output)
            .unwrap();
        assert_eq!(runner.run_count(), 0);
    }

    #[test]
    fn test_nonzero_exit_is_stage_failure() {
        let temp = TempDir::new().unwrap();
        let (config, _) = test_setup(&temp);
        let runner = RecordingRunner::new().with_side_effect(|spec| {
            Err(CommandError::ExitStatus {
                program: spec.program.clone(),
                code: 2,
            })
        });
        let stage = StageRunner::new(&config, &runner);

        let err = stage
            .run_convert(
                "se_sweden",
                &temp.path().join("in.mbtiles"),
                &temp.path().join("out.pmtiles"),
            )
            .unwrap_err();

        match err {
            StageError::Failed {
                region,
                stage,
                code,
            } => {
                assert_eq!(region, "se_sweden");
                assert_eq!(stage, Stage::Convert);
                assert_eq!(code, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_spawn_failure_names_program() {
        let temp = TempDir::new().unwrap();
        let (config, materialized) = test_setup(&temp);
        let runner = RecordingRunner::new().with_side_effect(|spec| {
            Err(CommandError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        });
        let stage = StageRunner::new(&config, &runner);

        let err = stage
            .run_render(
                "se_sweden",
                &PathBuf::from("in"),
                &temp.path().join("out.mbtiles"),
                &materialized,
                &PathBuf::from("store"),
            )
            .unwrap_err();

        assert!(err.to_string().contains("tilemaker"));
        assert!(matches!(err, StageError::Launch { stage: Stage::Render, .. }));
    }
}
