//! TOML suite files: several targets sharing one compile command.
//!
//! ```toml
//! command_file = "build/compile_command.txt"
//! repetitions = 3
//!
//! [[target]]
//! name = "tuple_get"
//! template = "bench/tuple_get.cpp.j2"
//! source = "build/bench.cpp"
//! artifact = "build/bench.o"
//! range = { start = 1, stop = 50, step = 5 }
//! ```
//!
//! Relative paths resolve against the directory holding the suite file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{ConfigError, MetabenchError};
use crate::invoker::{CompileCommand, Invoker, RetryPolicy};
use crate::measure::{MeasureJob, MeasureOptions, Measurer, Progress, DEFAULT_FEATURE_FLAG};
use crate::range::RangeSpec;
use crate::render::JinjaEngine;
use crate::schema::{MeasurementResult, RunMeta, SCHEMA_VERSION};

fn default_repetitions() -> usize {
    MeasureOptions::default().repetitions
}

fn default_warmup_runs() -> usize {
    MeasureOptions::default().warmup_runs
}

fn default_feature_flag() -> String {
    DEFAULT_FEATURE_FLAG.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteFile {
    command: Option<CompileCommand>,
    command_file: Option<PathBuf>,
    #[serde(default = "default_repetitions")]
    repetitions: usize,
    #[serde(default = "default_warmup_runs")]
    warmup_runs: usize,
    #[serde(default = "default_feature_flag")]
    feature_flag: String,
    #[serde(rename = "target", default)]
    targets: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetEntry {
    name: String,
    template: PathBuf,
    source: PathBuf,
    artifact: PathBuf,
    range: RangeSpec,
    repetitions: Option<usize>,
    command: Option<CompileCommand>,
    command_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SuiteTarget {
    pub job: MeasureJob,
    pub options: MeasureOptions,
}

/// A loaded and fully resolved suite.
#[derive(Debug, Clone)]
pub struct Suite {
    pub path: PathBuf,
    pub defaults: MeasureOptions,
    pub targets: Vec<SuiteTarget>,
}

impl Suite {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses suite text; `path` locates relative file references.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let suite_err = |message: String| ConfigError::Suite {
            path: path.to_path_buf(),
            message,
        };
        let file: SuiteFile = toml::from_str(text).map_err(|e| suite_err(e.to_string()))?;
        if file.targets.is_empty() {
            return Err(suite_err("no [[target]] entries".to_string()));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let resolve = |p: &Path| base_dir.join(p);

        let default_command =
            load_command(file.command.clone(), file.command_file.as_deref(), &resolve)?;
        let defaults = MeasureOptions {
            repetitions: file.repetitions,
            warmup_runs: file.warmup_runs,
            feature_flag: file.feature_flag.clone(),
            retry: None,
        };

        let mut targets = Vec::with_capacity(file.targets.len());
        for entry in file.targets {
            let command = load_command(entry.command, entry.command_file.as_deref(), &resolve)?;
            let command = match command {
                Some(command) => command,
                None => default_command.clone().ok_or_else(|| {
                    suite_err(format!("target '{}' has no command or command_file", entry.name))
                })?,
            };
            let options = MeasureOptions {
                repetitions: entry.repetitions.unwrap_or(defaults.repetitions),
                ..defaults.clone()
            };
            if options.repetitions == 0 {
                return Err(ConfigError::ZeroRepetitions);
            }

            targets.push(SuiteTarget {
                job: MeasureJob {
                    target: entry.name,
                    range: entry.range.materialize()?,
                    template: resolve(&entry.template),
                    source_path: resolve(&entry.source),
                    artifact_path: resolve(&entry.artifact),
                    command,
                },
                options,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            defaults,
            targets,
        })
    }

    /// Applies one retry policy to the suite and every target in it.
    pub fn set_retry(&mut self, policy: Option<RetryPolicy>) {
        for target in &mut self.targets {
            target.options.retry = policy.clone();
        }
        self.defaults.retry = policy;
    }

    /// Run metadata for a report over this suite. Repetitions and command
    /// digests are recorded per target, since targets may override both.
    pub fn run_meta(&self, timestamp_utc: String, git_sha: Option<String>) -> RunMeta {
        let mut repetitions = BTreeMap::new();
        let mut command_sha256 = BTreeMap::new();
        for target in &self.targets {
            let name = target.job.target.clone();
            repetitions.insert(name.clone(), target.options.repetitions);
            command_sha256.insert(name, sha256_hex(&target.job.command.to_string()));
        }

        RunMeta {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            repetitions,
            warmup_runs: self.defaults.warmup_runs,
            feature_flag: self.defaults.feature_flag.clone(),
            timestamp_utc,
            git_sha,
            command_sha256,
        }
    }

    /// Measures every target in file order. The first failure aborts the suite.
    pub fn run<I: Invoker, P: Progress>(
        &self,
        mut invoker: I,
        mut progress: P,
    ) -> Result<Vec<MeasurementResult>, MetabenchError> {
        let mut results = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            info!(suite = %self.path.display(), target_name = %target.job.target, "suite target");
            let mut measurer = Measurer::new(
                JinjaEngine::new(),
                &mut invoker,
                &mut progress,
                target.options.clone(),
            )?;
            results.push(measurer.measure(&target.job)?);
        }
        Ok(results)
    }
}

fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn load_command(
    command: Option<CompileCommand>,
    command_file: Option<&Path>,
    resolve: &impl Fn(&Path) -> PathBuf,
) -> Result<Option<CompileCommand>, ConfigError> {
    match (command, command_file) {
        (Some(command), _) => Ok(Some(command)),
        (None, Some(file)) => CompileCommand::from_file(&resolve(file)).map(Some),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const SUITE: &str = r#"
command_file = "compile_command.txt"
repetitions = 2

[[target]]
name = "tuple_get"
template = "tuple_get.cpp.j2"
source = "build/bench.cpp"
artifact = "build/bench.o"
range = { start = 1, stop = 9, step = 4 }

[[target]]
name = "flag_map"
template = "flag_map.cpp.j2"
source = "build/bench.cpp"
artifact = "build/bench.o"
range = [8, 16]
repetitions = 5
command = ["c++", "-c", "bench.cpp"]
"#;

    #[test]
    fn test_parse_resolves_paths_and_overrides() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("compile_command.txt"), "ninja bench.o\n").unwrap();
        let path = dir.path().join("suite.toml");

        let suite = Suite::parse(SUITE, &path).unwrap();
        assert_eq!(suite.targets.len(), 2);
        assert_eq!(suite.defaults.repetitions, 2);
        assert_eq!(suite.defaults.feature_flag, "METABENCH");

        let first = &suite.targets[0];
        assert_eq!(first.job.target, "tuple_get");
        assert_eq!(first.job.range, vec![json!(1), json!(5), json!(9)]);
        assert_eq!(first.job.template, dir.path().join("tuple_get.cpp.j2"));
        assert_eq!(first.job.source_path, dir.path().join("build/bench.cpp"));
        assert_eq!(
            first.job.command,
            CompileCommand::Shell("ninja bench.o".to_string())
        );
        assert_eq!(first.options.repetitions, 2);

        let second = &suite.targets[1];
        assert_eq!(second.options.repetitions, 5);
        assert_eq!(
            second.job.command,
            CompileCommand::Argv(vec!["c++".into(), "-c".into(), "bench.cpp".into()])
        );
    }

    #[test]
    fn test_run_meta_records_per_target_repetitions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("compile_command.txt"), "ninja bench.o\n").unwrap();
        let suite = Suite::parse(SUITE, &dir.path().join("suite.toml")).unwrap();

        let meta = suite.run_meta("unix:0".to_string(), None);
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert_eq!(meta.repetitions["tuple_get"], 2);
        assert_eq!(meta.repetitions["flag_map"], 5);
        assert_eq!(meta.command_sha256.len(), 2);
        assert_eq!(meta.command_sha256["tuple_get"], sha256_hex("ninja bench.o"));
        assert_ne!(meta.command_sha256["tuple_get"], meta.command_sha256["flag_map"]);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["repetitions"], json!({"flag_map": 5, "tuple_get": 2}));
    }

    #[test]
    fn test_set_retry_reaches_every_target() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("compile_command.txt"), "ninja bench.o\n").unwrap();
        let mut suite = Suite::parse(SUITE, &dir.path().join("suite.toml")).unwrap();
        assert!(suite.targets.iter().all(|t| t.options.retry.is_none()));

        suite.set_retry(Some(RetryPolicy::new("opening build log", 4)));
        for target in &suite.targets {
            let policy = target.options.retry.as_ref().unwrap();
            assert_eq!(policy.max_retries, 4);
            assert_eq!(policy.stderr_pattern, "opening build log");
        }
        assert_eq!(suite.targets[1].options.repetitions, 5);
    }

    #[test]
    fn test_missing_command_rejected() {
        let dir = tempdir().unwrap();
        let text = r#"
[[target]]
name = "t"
template = "t.j2"
source = "s.cpp"
artifact = "s.o"
range = [1]
"#;
        let err = Suite::parse(text, &dir.path().join("suite.toml")).unwrap_err();
        assert!(err.to_string().contains("no command"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempdir().unwrap();
        let text = "command = \"true\"\nrepititions = 3\n";
        assert!(Suite::parse(text, &dir.path().join("suite.toml")).is_err());
    }

    #[test]
    fn test_empty_suite_rejected() {
        let dir = tempdir().unwrap();
        let err = Suite::parse("command = \"true\"\n", &dir.path().join("suite.toml")).unwrap_err();
        assert!(err.to_string().contains("no [[target]]"));
    }
}
