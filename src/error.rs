//! Error types for the measurement pipeline.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Template read or evaluation failure.
#[derive(Error, Debug)]
#[error("C++ file generation error. Template: {}\nCurrent item: {input}\nError:\n{message}", .template.display())]
pub struct RenderError {
    pub template: PathBuf,
    /// JSON text of the offending input value.
    pub input: String,
    pub message: String,
}

/// A compiler invocation that ran to completion with a non-zero exit.
#[derive(Error, Debug, Clone)]
#[error("Error while c++ file compilation ({status})\n\nstdout:\n{stdout}\n\nstderr:\n{stderr}\n")]
pub struct CompilationFailure {
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("failed to start compile command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Failed(#[from] CompilationFailure),
}

/// I/O failure while resetting the source/artifact slot.
#[derive(Error, Debug)]
#[error("{action} {}: {source}", .path.display())]
pub struct HarnessError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Any single step of a measurement cycle.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// First failure of a `measure` run, tagged with the target it aborted.
#[derive(Error, Debug)]
#[error("target '{target}' failed at input {input}:\n{source}")]
pub struct MeasureError {
    pub target: String,
    pub input: String,
    #[source]
    pub source: StepError,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid range `{spec}`: {reason}")]
    InvalidRange { spec: String, reason: String },

    #[error("repetitions must be at least 1")]
    ZeroRepetitions,

    #[error("compile command file {} is empty", .path.display())]
    EmptyCommand { path: PathBuf },

    #[error("suite {}: {message}", .path.display())]
    Suite { path: PathBuf, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Top-level error of the CLI.
#[derive(Error, Debug)]
pub enum MetabenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Measure(#[from] MeasureError),

    #[error("report error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MetabenchError {
    /// Exit codes:
    /// - 1: configuration or IO failure
    /// - 2: template rendering failure
    /// - 3: compilation failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Measure(e) => match &e.source {
                StepError::Render(_) => ExitCode::from(2),
                StepError::Invoke(_) => ExitCode::from(3),
                StepError::Harness(_) => ExitCode::from(1),
            },
            Self::Config(_) | Self::Report(_) | Self::Io(_) => ExitCode::from(1),
        }
    }
}
