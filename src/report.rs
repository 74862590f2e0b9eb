//! Append-only report streams. The detail log receives every command line,
//! captured output and announced message; the summary receives announced
//! messages only. Announced messages are also echoed to stdout.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{HarnessError, cli::RunMode, controller::Counters};

pub const SEPARATOR: &str = "#################################";

#[derive(Debug)]
pub struct Reporter {
    log_path: PathBuf,
    summary: File,
    echo_stdout: bool,
}

impl Reporter {
    /// Truncates the summary; the log is only ever appended to.
    pub fn create(log: &Path, summary: &Path, echo_stdout: bool) -> Result<Self, HarnessError> {
        let summary_file = File::create(summary).map_err(|e| HarnessError::io_at(summary, e))?;
        Ok(Self {
            log_path: log.to_path_buf(),
            summary: summary_file,
            echo_stdout,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn message(&mut self, msg: &str) -> Result<(), HarnessError> {
        if self.echo_stdout {
            println!("{msg}");
        }
        writeln!(self.summary, "{msg}").map_err(|e| HarnessError::io(format!("summary: {e}")))?;
        self.headline(msg)
    }

    /// Writes `#### <line>` to the detail log only.
    pub fn headline(&mut self, line: &str) -> Result<(), HarnessError> {
        self.append_log(format!("#### {line}\n").as_bytes())
    }

    /// Copies a captured output file into the detail log.
    pub fn append_file(&mut self, path: &Path) -> Result<(), HarnessError> {
        let data = fs::read(path).map_err(|e| HarnessError::io_at(path, e))?;
        self.append_log(&data)
    }

    fn append_log(&self, data: &[u8]) -> Result<(), HarnessError> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| HarnessError::io_at(&self.log_path, e))?;
        log.write_all(data)
            .map_err(|e| HarnessError::io_at(&self.log_path, e))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub target: String,
    pub passed: u64,
    pub failed: u64,
    pub regressions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HarnessReport {
    pub mode: RunMode,
    pub counters: Counters,
    pub targets: Vec<TargetSummary>,
}

pub fn write_report(path: &Path, report: &HarnessReport) -> Result<(), HarnessError> {
    let data =
        serde_json::to_vec_pretty(report).map_err(|e| HarnessError::io(e.to_string()))?;
    fs::write(path, data).map_err(|e| HarnessError::io_at(path, e))
}

/// Removes the previous detail log and every `*.out` capture in `test_dir`.
pub fn clean_previous_run(log: &Path, test_dir: &Path) -> Result<usize, HarnessError> {
    remove_if_present(log)?;
    let mut removed = 0;
    let entries = match fs::read_dir(test_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(HarnessError::io_at(test_dir, err)),
    };
    for entry in entries {
        let path = entry.map_err(|e| HarnessError::io_at(test_dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "out") {
            remove_if_present(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn remove_if_present(path: &Path) -> Result<(), HarnessError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(HarnessError::io_at(path, err)),
    }
}
