//! Runs one compiler invocation and times it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompilationFailure, ConfigError, InvokeError};

/// A fully resolved compiler invocation. The harness never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompileCommand {
    /// Run through the platform shell.
    Shell(String),
    /// Program followed by its arguments.
    Argv(Vec<String>),
}

impl CompileCommand {
    /// Reads a shell command line from `path`, as written by the build system.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text = text.trim_end();
        if text.trim().is_empty() {
            return Err(ConfigError::EmptyCommand {
                path: path.to_path_buf(),
            });
        }
        Ok(CompileCommand::Shell(text.to_string()))
    }

    fn to_command(&self) -> Command {
        match self {
            CompileCommand::Shell(line) => {
                let mut cmd = if cfg!(windows) {
                    let mut c = Command::new("cmd");
                    c.arg("/C");
                    c
                } else {
                    let mut c = Command::new("sh");
                    c.arg("-c");
                    c
                };
                cmd.arg(line);
                cmd
            }
            CompileCommand::Argv(argv) => {
                let mut cmd = Command::new(argv.first().map(String::as_str).unwrap_or_default());
                cmd.args(argv.iter().skip(1));
                cmd
            }
        }
    }
}

impl fmt::Display for CompileCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileCommand::Shell(line) => f.write_str(line),
            CompileCommand::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

/// Result of a single child process run.
#[derive(Debug, Clone)]
pub struct CompilationOutcome {
    pub duration: Duration,
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CompilationOutcome {
    fn from_output(duration: Duration, output: Output) -> Self {
        Self {
            duration,
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// Turns a failed run into an error carrying its captured output verbatim.
    pub fn into_result(self) -> Result<Self, CompilationFailure> {
        if self.success {
            Ok(self)
        } else {
            Err(CompilationFailure {
                status: self.status,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Something that can execute a compile command.
///
/// A non-zero exit is reported through `CompilationOutcome::success`; only a
/// failure to start the process is an `Err`.
pub trait Invoker {
    fn run(&mut self, command: &CompileCommand) -> Result<CompilationOutcome, InvokeError>;
}

impl<I: Invoker + ?Sized> Invoker for &mut I {
    fn run(&mut self, command: &CompileCommand) -> Result<CompilationOutcome, InvokeError> {
        (**self).run(command)
    }
}

/// Spawns the command as a child process and blocks until it exits.
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker {
    pub workdir: Option<PathBuf>,
}

impl ProcessInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_workdir(mut self, dir: PathBuf) -> Self {
        self.workdir = Some(dir);
        self
    }
}

impl Invoker for ProcessInvoker {
    fn run(&mut self, command: &CompileCommand) -> Result<CompilationOutcome, InvokeError> {
        let mut cmd = command.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let spawn_err = |source| InvokeError::Spawn {
            command: command.to_string(),
            source,
        };

        let start = Instant::now();
        let child = cmd.spawn().map_err(spawn_err)?;
        let output = child.wait_with_output().map_err(spawn_err)?;
        let elapsed = start.elapsed();

        debug!(
            duration_s = elapsed.as_secs_f64(),
            status = %output.status,
            "compile finished"
        );
        Ok(CompilationOutcome::from_output(elapsed, output))
    }
}

/// Retry on a known transient build-tool error.
///
/// Never active by default; a lock error is fatal unless the caller opts in.
/// Applied by the measurer, which re-prepares the source and artifact slot
/// before each retried invocation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Substring of stderr that marks a failure as transient.
    pub stderr_pattern: String,
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(stderr_pattern: impl Into<String>, max_retries: u32) -> Self {
        Self {
            stderr_pattern: stderr_pattern.into(),
            max_retries,
            delay: Duration::from_millis(100),
        }
    }

    pub fn is_transient(&self, outcome: &CompilationOutcome) -> bool {
        !outcome.success && outcome.stderr.contains(&self.stderr_pattern)
    }
}
