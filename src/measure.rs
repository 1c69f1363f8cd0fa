//! Differential base/total measurement over an input range.
//!
//! For every input the base rendering and the "total" rendering (base with a
//! feature-flag `#define` prepended) are each compiled `repetitions` times,
//! block-sequentially, base first. The first input additionally gets untimed
//! warm-up compiles. Any failure aborts the whole target.

use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, MeasureError, MetabenchError, StepError};
use crate::harness::Harness;
use crate::invoker::{CompileCommand, Invoker, ProcessInvoker, RetryPolicy};
use crate::render::{JinjaEngine, Renderer, TemplateEngine};
use crate::schema::{MeasurementPoint, MeasurementResult};

pub const DEFAULT_FEATURE_FLAG: &str = "METABENCH";

#[derive(Debug, Clone)]
pub struct MeasureOptions {
    pub repetitions: usize,
    /// Untimed compiles of the base variant before index 0.
    pub warmup_runs: usize,
    /// Macro defined by the prologue of the total variant.
    pub feature_flag: String,
    /// Re-runs a compile whose failure matches the policy. Off by default.
    pub retry: Option<RetryPolicy>,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            repetitions: 3,
            warmup_runs: 1,
            feature_flag: DEFAULT_FEATURE_FLAG.to_string(),
            retry: None,
        }
    }
}

impl MeasureOptions {
    pub fn total_code(&self, base: &str) -> String {
        format!("#define {}\n{base}", self.feature_flag)
    }
}

/// Everything that identifies one target's measurement run.
#[derive(Debug, Clone)]
pub struct MeasureJob {
    pub target: String,
    pub range: Vec<Value>,
    pub template: PathBuf,
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
    pub command: CompileCommand,
}

/// Receives progress for the caller; purely informational.
pub trait Progress {
    fn advance(&mut self, target: &str, done: usize, total: usize);
    fn finish(&mut self, target: &str);
    fn failed(&mut self, target: &str, error: &MeasureError);
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn advance(&mut self, target: &str, done: usize, total: usize) {
        (**self).advance(target, done, total)
    }

    fn finish(&mut self, target: &str) {
        (**self).finish(target)
    }

    fn failed(&mut self, target: &str, error: &MeasureError) {
        (**self).failed(target, error)
    }
}

/// `### metabench <target>..... i/n`, rewritten in place on stderr.
#[derive(Debug, Default)]
pub struct StderrProgress;

impl Progress for StderrProgress {
    fn advance(&mut self, target: &str, done: usize, total: usize) {
        let mut err = io::stderr().lock();
        let _ = write!(err, "\r### metabench {target}..... {done}/{total}");
        let _ = err.flush();
    }

    fn finish(&mut self, _target: &str) {
        eprintln!();
    }

    fn failed(&mut self, target: &str, _error: &MeasureError) {
        eprintln!("\n\nMeasure error for target '{target}':");
    }
}

/// Discards all progress.
#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&mut self, _target: &str, _done: usize, _total: usize) {}
    fn finish(&mut self, _target: &str) {}
    fn failed(&mut self, _target: &str, _error: &MeasureError) {}
}

pub struct Measurer<E, I, P> {
    renderer: Renderer<E>,
    invoker: I,
    progress: P,
    options: MeasureOptions,
}

impl<E: TemplateEngine, I: Invoker, P: Progress> Measurer<E, I, P> {
    pub fn new(
        engine: E,
        invoker: I,
        progress: P,
        options: MeasureOptions,
    ) -> Result<Self, ConfigError> {
        if options.repetitions == 0 {
            return Err(ConfigError::ZeroRepetitions);
        }
        Ok(Self {
            renderer: Renderer::new(engine),
            invoker,
            progress,
            options,
        })
    }

    /// Runs the full range for one target. Points are appended in range
    /// order; on failure the partial result is dropped.
    pub fn measure(&mut self, job: &MeasureJob) -> Result<MeasurementResult, MeasureError> {
        info!(
            target_name = %job.target,
            inputs = job.range.len(),
            repetitions = self.options.repetitions,
            "measuring"
        );

        let harness = Harness::new(&job.source_path, &job.artifact_path);
        let mut result = MeasurementResult {
            target: job.target.clone(),
            range: job.range.clone(),
            data: Vec::with_capacity(job.range.len()),
        };

        let total = job.range.len();
        self.progress.advance(&job.target, 0, total);
        for (index, input) in job.range.iter().enumerate() {
            let point = match self.measure_point(job, &harness, index, input) {
                Ok(point) => point,
                Err(source) => {
                    let error = MeasureError {
                        target: job.target.clone(),
                        input: input.to_string(),
                        source,
                    };
                    self.progress.failed(&job.target, &error);
                    return Err(error);
                }
            };
            result.data.push(point);
            self.progress.advance(&job.target, index + 1, total);
        }
        self.progress.finish(&job.target);

        Ok(result)
    }

    fn measure_point(
        &mut self,
        job: &MeasureJob,
        harness: &Harness,
        index: usize,
        input: &Value,
    ) -> Result<MeasurementPoint, StepError> {
        let base = self.renderer.render(&job.template, input)?;

        if index == 0 {
            for run in 0..self.options.warmup_runs {
                let secs = self.compile(harness, &base, &job.command)?;
                debug!(run, secs, "warm-up compile");
            }
        }

        let base_times = self.compile_n(harness, &base, &job.command)?;
        let total = self.options.total_code(&base);
        let total_times = self.compile_n(harness, &total, &job.command)?;

        debug!(index, %input, ?base_times, ?total_times, "point measured");
        Ok(MeasurementPoint {
            index,
            input: input.clone(),
            base_times,
            total_times,
        })
    }

    fn compile_n(
        &mut self,
        harness: &Harness,
        code: &str,
        command: &CompileCommand,
    ) -> Result<Vec<f64>, StepError> {
        (0..self.options.repetitions)
            .map(|_| self.compile(harness, code, command))
            .collect()
    }

    /// One prepare + invoke cycle; returns wall-clock seconds of the
    /// successful run. Transient failures are retried from a fresh prepare.
    fn compile(
        &mut self,
        harness: &Harness,
        code: &str,
        command: &CompileCommand,
    ) -> Result<f64, StepError> {
        let mut attempt = 0;
        let outcome = loop {
            harness.prepare(code)?;
            let outcome = self.invoker.run(command)?;
            match &self.options.retry {
                Some(policy) if attempt < policy.max_retries && policy.is_transient(&outcome) => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = policy.max_retries,
                        pattern = %policy.stderr_pattern,
                        "transient compile failure, retrying"
                    );
                    thread::sleep(policy.delay);
                }
                _ => break outcome,
            }
        };
        let outcome = outcome
            .into_result()
            .map_err(|failure| StepError::Invoke(failure.into()))?;
        Ok(outcome.duration.as_secs_f64())
    }
}

/// Measures one target with the default engine, a child-process invoker and
/// progress on stderr.
pub fn measure(
    target: &str,
    range: Vec<Value>,
    template: PathBuf,
    source_path: PathBuf,
    repetitions: usize,
    artifact_path: PathBuf,
    command: CompileCommand,
) -> Result<MeasurementResult, MetabenchError> {
    let options = MeasureOptions {
        repetitions,
        ..MeasureOptions::default()
    };
    let job = MeasureJob {
        target: target.to_string(),
        range,
        template,
        source_path,
        artifact_path,
        command,
    };
    let mut measurer = Measurer::new(
        JinjaEngine::new(),
        ProcessInvoker::new(),
        StderrProgress,
        options,
    )?;
    Ok(measurer.measure(&job)?)
}
