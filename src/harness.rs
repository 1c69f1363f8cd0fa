//! Forced-staleness protocol run before every compile.
//!
//! Each timed compile must be a full compilation, so before the invoker runs
//! the harness (1) rewrites the generated source, (2) pushes its mtime past
//! any value it held before and (3) deletes the compiled artifact.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::trace;

use crate::error::HarnessError;

/// Increments tried when the filesystem rounds timestamps.
const MTIME_STEPS: [Duration; 3] = [
    Duration::from_millis(1),
    Duration::from_secs(1),
    Duration::from_secs(2),
];

/// Exclusive owner of one generated source file and its build artifact.
#[derive(Debug, Clone)]
pub struct Harness {
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
}

impl Harness {
    pub fn new(source_path: impl Into<PathBuf>, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            artifact_path: artifact_path.into(),
        }
    }

    pub fn prepare(&self, code: &str) -> Result<(), HarnessError> {
        let source = &self.source_path;
        let previous = fs::metadata(source).and_then(|m| m.modified()).ok();

        if let Some(parent) = source.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| err("create directory", parent, e))?;
        }

        let mut file = File::create(source).map_err(|e| err("write", source, e))?;
        file.write_all(code.as_bytes())
            .map_err(|e| err("write", source, e))?;
        file.flush().map_err(|e| err("write", source, e))?;
        let mtime = advance_mtime(&file, previous).map_err(|e| err("touch", source, e))?;
        drop(file);

        match fs::remove_file(&self.artifact_path) {
            Ok(()) => trace!(artifact = %self.artifact_path.display(), "removed stale artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(err("remove", &self.artifact_path, e)),
        }

        trace!(source = %source.display(), ?mtime, bytes = code.len(), "source prepared");
        Ok(())
    }
}

/// Writes `code` to `source_path`, advances its mtime and deletes `artifact_path`.
pub fn prepare(source_path: &Path, code: &str, artifact_path: &Path) -> Result<(), HarnessError> {
    Harness::new(source_path, artifact_path).prepare(code)
}

fn err(action: &'static str, path: &Path, source: io::Error) -> HarnessError {
    HarnessError {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Sets the mtime to now, or to the smallest step past `previous` that the
/// filesystem actually records as newer.
fn advance_mtime(file: &File, previous: Option<SystemTime>) -> io::Result<SystemTime> {
    let now = SystemTime::now();
    let Some(previous) = previous else {
        file.set_modified(now)?;
        return Ok(now);
    };

    let mut recorded = previous;
    for step in MTIME_STEPS {
        let wanted = now.max(previous + step);
        file.set_modified(wanted)?;
        recorded = file.metadata()?.modified()?;
        if recorded > previous {
            break;
        }
    }
    Ok(recorded)
}
