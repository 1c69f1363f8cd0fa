use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA_VERSION: u32 = 1;

/// Timing samples for one input value. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    pub index: usize,
    pub input: Value,
    pub base_times: Vec<f64>,
    pub total_times: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub target: String,
    pub range: Vec<Value>,
    pub data: Vec<MeasurementPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    /// Repetitions per variant, keyed by target.
    pub repetitions: BTreeMap<String, usize>,
    pub warmup_runs: usize,
    pub feature_flag: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
    /// SHA-256 of each target's compile command line, keyed by target.
    pub command_sha256: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetabenchReport {
    pub run: RunMeta,
    pub results: Vec<MeasurementResult>,
}
