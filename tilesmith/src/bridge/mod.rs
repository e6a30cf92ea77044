//! External command execution, native or via the remote bridge.
//!
//! The pipeline never spawns processes directly; it goes through the
//! [`CommandRunner`] trait, selected once at startup. The native runner
//! executes commands in the primary environment as-is. The bridged
//! runner wraps them in the bridge launcher and translates every path
//! it hands over.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

mod path;

pub use path::{translate_path, DEFAULT_MOUNT_ROOT};

/// A command to run: program, arguments, optional working directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a spec with no working-directory override.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }
}

/// Errors from running an external command.
#[derive(Debug)]
pub enum CommandError {
    /// The command could not be started at all.
    Spawn { program: String, source: io::Error },

    /// The command ran and exited non-zero.
    ExitStatus { program: String, code: i32 },

    /// The command was killed before exiting.
    Terminated { program: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Spawn { program, source } => {
                write!(f, "failed to start '{}': {}", program, source)
            }
            CommandError::ExitStatus { program, code } => {
                write!(f, "'{}' exited with code {}", program, code)
            }
            CommandError::Terminated { program } => {
                write!(f, "'{}' was terminated by a signal", program)
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Command-execution capability shared by all pipeline stages.
pub trait CommandRunner: Send + Sync {
    /// Short name for log lines ("native" or "bridged").
    fn name(&self) -> &str;

    /// Run a command to completion, discarding its output.
    fn run(&self, spec: &CommandSpec) -> Result<(), CommandError>;

    /// Run a command to completion and capture its stdout.
    fn run_capture(&self, spec: &CommandSpec) -> Result<String, CommandError>;

    /// Translate a primary-environment path into the form the executed
    /// command will understand. Identity for the native runner.
    fn translate(&self, path: &Path) -> String;
}

fn run_command(mut command: Command, program: &str) -> Result<std::process::Output, CommandError> {
    debug!(program, "running external command");
    let output = command.output().map_err(|e| CommandError::Spawn {
        program: program.to_string(),
        source: e,
    })?;

    if !output.status.success() {
        return match output.status.code() {
            Some(code) => Err(CommandError::ExitStatus {
                program: program.to_string(),
                code,
            }),
            None => Err(CommandError::Terminated {
                program: program.to_string(),
            }),
        };
    }

    Ok(output)
}

/// Runs commands directly in the primary environment.
pub struct NativeRunner;

impl NativeRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

impl Default for NativeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for NativeRunner {
    fn name(&self) -> &str {
        "native"
    }

    fn run(&self, spec: &CommandSpec) -> Result<(), CommandError> {
        run_command(self.command(spec), &spec.program).map(|_| ())
    }

    fn run_capture(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        let output = run_command(self.command(spec), &spec.program)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn translate(&self, path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

/// Runs commands inside the remote execution bridge.
///
/// Every path crossing the boundary must already be translated with
/// [`CommandRunner::translate`]; the runner translates the working
/// directory itself.
pub struct BridgedRunner {
    /// Bridge launcher command (e.g. "wsl").
    launcher: String,

    /// Bridge target identifier (e.g. a distribution name).
    target: String,

    /// Mount root for primary-environment drives inside the bridge.
    mount_root: String,
}

impl BridgedRunner {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            launcher: "wsl".to_string(),
            target: target.into(),
            mount_root: DEFAULT_MOUNT_ROOT.to_string(),
        }
    }

    /// Override the bridge launcher command.
    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = launcher.into();
        self
    }

    /// Override the drive mount root.
    pub fn with_mount_root(mut self, mount_root: impl Into<String>) -> Self {
        self.mount_root = mount_root.into();
        self
    }

    /// Build the launcher invocation for a spec.
    ///
    /// Visible to tests so argument assembly can be checked without
    /// spawning anything.
    fn launcher_args(&self, spec: &CommandSpec) -> Vec<String> {
        let mut args = vec!["-d".to_string(), self.target.clone()];
        if let Some(cwd) = &spec.cwd {
            args.push("--cd".to_string());
            args.push(translate_path(cwd, &self.mount_root));
        }
        args.push("--".to_string());
        args.push(spec.program.clone());
        args.extend(spec.args.iter().cloned());
        args
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new(&self.launcher);
        command.args(self.launcher_args(spec));
        command
    }
}

impl CommandRunner for BridgedRunner {
    fn name(&self) -> &str {
        "bridged"
    }

    fn run(&self, spec: &CommandSpec) -> Result<(), CommandError> {
        run_command(self.command(spec), &spec.program).map(|_| ())
    }

    fn run_capture(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        let output = run_command(self.command(spec), &spec.program)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn translate(&self, path: &Path) -> String {
        translate_path(path, &self.mount_root)
    }
}
