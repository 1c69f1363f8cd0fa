use clap::{Parser, Subcommand};
use metabench::config::{Suite, SuiteTarget};
use metabench::error::MetabenchError;
use metabench::invoker::{CompileCommand, ProcessInvoker, RetryPolicy};
use metabench::measure::{MeasureJob, MeasureOptions, StderrProgress, DEFAULT_FEATURE_FLAG};
use metabench::range::RangeSpec;
use metabench::schema::MetabenchReport;
use metabench::summary;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure one target over an input range.
    Measure {
        /// Benchmark name used in progress output and the report.
        #[arg(long)]
        target: String,

        /// `start..stop[:step]` (inclusive), a comma-separated list of values,
        /// or a JSON array such as `[[1,2],[3]]`.
        #[arg(long)]
        range: RangeSpec,

        /// Jinja template; the current input is bound as `item`.
        #[arg(long, value_name = "FILE")]
        template: PathBuf,

        /// Generated source file the compile command builds.
        #[arg(long, value_name = "FILE")]
        source: PathBuf,

        /// Build output deleted before every compile.
        #[arg(long, value_name = "FILE")]
        artifact: PathBuf,

        /// Compile command line, run through the shell.
        #[arg(long, conflicts_with = "command_file", required_unless_present = "command_file")]
        command: Option<String>,

        /// File holding the compile command line.
        #[arg(long, value_name = "FILE")]
        command_file: Option<PathBuf>,

        #[arg(long, short = 'n', default_value_t = 3)]
        repetitions: usize,

        /// Untimed compiles before the first input.
        #[arg(long, default_value_t = 1)]
        warmup_runs: usize,

        /// Macro defined at the top of the total variant.
        #[arg(long, default_value = DEFAULT_FEATURE_FLAG)]
        feature_flag: String,

        #[command(flatten)]
        invoker: InvokerArgs,

        #[command(flatten)]
        retry: RetryArgs,
    },

    /// Measure every target of a TOML suite file.
    Suite {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[command(flatten)]
        invoker: InvokerArgs,

        #[command(flatten)]
        retry: RetryArgs,
    },

    /// Print mean/min/max per point of a JSON report.
    Summarize {
        #[arg(value_name = "FILE")]
        report: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct InvokerArgs {
    /// Working directory for the compile command.
    #[arg(long, value_name = "DIR")]
    workdir: Option<PathBuf>,
}

impl InvokerArgs {
    fn invoker(&self) -> ProcessInvoker {
        match &self.workdir {
            Some(dir) => ProcessInvoker::new().with_workdir(dir.clone()),
            None => ProcessInvoker::new(),
        }
    }
}

#[derive(clap::Args, Debug)]
struct RetryArgs {
    /// Retry a failed compile whose stderr contains this text (off by default).
    #[arg(long, value_name = "PATTERN")]
    retry_on: Option<String>,

    #[arg(long, default_value_t = 10, requires = "retry_on")]
    max_retries: u32,

    #[arg(long, default_value_t = 100, requires = "retry_on")]
    retry_delay_ms: u64,
}

impl RetryArgs {
    fn policy(&self) -> Option<RetryPolicy> {
        self.retry_on.as_ref().map(|pattern| RetryPolicy {
            stderr_pattern: pattern.clone(),
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "metabench")]
#[command(about = "Compile-time scaling benchmark runner (JSON output)")]
struct Args {
    /// Where to write the JSON report. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metabench=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), MetabenchError> {
    let (mut suite, invoker, retry) = match args.cmd {
        Command::Measure {
            target,
            range,
            template,
            source,
            artifact,
            command,
            command_file,
            repetitions,
            warmup_runs,
            feature_flag,
            invoker,
            retry,
        } => {
            // clap enforces exactly one of --command / --command-file.
            let command = match command_file {
                Some(file) => CompileCommand::from_file(&file)?,
                None => CompileCommand::Shell(command.unwrap_or_default()),
            };
            let options = MeasureOptions {
                repetitions,
                warmup_runs,
                feature_flag,
                retry: None,
            };
            let suite = Suite {
                path: PathBuf::from("<command line>"),
                defaults: options.clone(),
                targets: vec![SuiteTarget {
                    job: MeasureJob {
                        target,
                        range: range.materialize()?,
                        template,
                        source_path: source,
                        artifact_path: artifact,
                        command,
                    },
                    options,
                }],
            };
            (suite, invoker, retry)
        }
        Command::Suite {
            path,
            invoker,
            retry,
        } => (Suite::load(&path)?, invoker, retry),
        Command::Summarize { report } => {
            let text = fs::read_to_string(&report)?;
            let parsed: MetabenchReport = serde_json::from_str(&text)?;
            for result in &parsed.results {
                println!("{}", summary::render_table(result));
            }
            return Ok(());
        }
    };

    suite.set_retry(retry.policy());
    let results = suite.run(invoker.invoker(), StderrProgress)?;
    let report = MetabenchReport {
        run: suite.run_meta(now_utc(), git_sha_short()),
        results,
    };

    let json = serde_json::to_string_pretty(&report)?;
    if let Some(out) = args.out {
        fs::write(out, json)?;
    } else {
        println!("{json}");
    }

    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    }
}
