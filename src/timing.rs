//! Runtime extraction from captured test output, and the per-cycle registry of
//! NVM/baseline ratio bounds with the cumulative runtimes observed for them.

use std::{fs, path::Path};

use ahash::AHashMap;
use serde::Serialize;

use crate::HarnessError;

pub const TIMING_MARKER: &str = "time elapsed";

/// Reported when an output carries no timing line, large enough to push any
/// ratio it takes part in toward detection.
pub const MISSING_RUNTIME: u64 = (1 << 30) - 1;

/// Scans captured output for the first line containing [`TIMING_MARKER`] and
/// returns its third whitespace-separated token. Outputs without a timing line
/// yield [`MISSING_RUNTIME`]. Bytes that are not UTF-8 are read lossily.
pub fn extract_runtime(output: &Path) -> Result<u64, HarnessError> {
    let raw = fs::read(output).map_err(|e| HarnessError::io_at(output, e))?;
    let text = String::from_utf8_lossy(&raw);
    match text.lines().find(|line| line.contains(TIMING_MARKER)) {
        Some(line) => parse_runtime_line(line),
        None => Ok(MISSING_RUNTIME),
    }
}

pub fn parse_runtime_line(line: &str) -> Result<u64, HarnessError> {
    let token = line
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| HarnessError::invalid_timing(format!("no runtime token in {line:?}")))?;
    token
        .parse()
        .map_err(|_| HarnessError::invalid_timing(format!("runtime {token:?} is not an integer")))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimingBound {
    pub nvm: String,
    pub baseline: String,
    pub min_ratio: u64,
    pub max_ratio: u64,
}

#[derive(Clone, Debug, Default)]
pub struct TimingRegistry {
    bounds: Vec<TimingBound>,
    runtimes: AHashMap<String, u64>,
}

impl TimingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path).map_err(|e| HarnessError::io_at(path, e))?;
        Self::parse(&text)
    }

    /// Parses `nvm_test baseline_test min_ratio max_ratio` records. Anything
    /// from `#` to the end of a line is a comment; lines left blank are
    /// skipped. Every name mentioned is seeded at zero.
    pub fn parse(text: &str) -> Result<Self, HarnessError> {
        let mut registry = Self::new();
        for (idx, line) in text.lines().enumerate() {
            let record = line.split_once('#').map_or(line, |(record, _)| record);
            let trimmed = record.trim();
            if trimmed.is_empty() {
                continue;
            }
            let bound = parse_bound(trimmed)
                .map_err(|reason| HarnessError::invalid_bounds(format!("line {}: {reason}", idx + 1)))?;
            registry.insert(bound);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, bound: TimingBound) {
        self.runtimes.entry(bound.nvm.clone()).or_insert(0);
        self.runtimes.entry(bound.baseline.clone()).or_insert(0);
        match self.bounds.iter_mut().find(|b| b.nvm == bound.nvm) {
            Some(existing) => *existing = bound,
            None => self.bounds.push(bound),
        }
    }

    /// Adds `delta` to a seeded test's runtime. Untracked names are ignored and
    /// reported as `false`.
    pub fn accumulate(&mut self, name: &str, delta: u64) -> bool {
        match self.runtimes.get_mut(name) {
            Some(total) => {
                *total = total.saturating_add(delta);
                true
            }
            None => false,
        }
    }

    pub fn runtime(&self, name: &str) -> Option<u64> {
        self.runtimes.get(name).copied()
    }

    pub fn bounds(&self) -> &[TimingBound] {
        &self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn clear(&mut self) {
        self.bounds.clear();
        self.runtimes.clear();
    }
}

fn parse_bound(line: &str) -> Result<TimingBound, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [nvm, baseline, min, max] = fields.as_slice() else {
        return Err(format!("expected 4 fields, found {}", fields.len()));
    };
    let ratio = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| format!("ratio {s:?} is not an unsigned integer"))
    };
    let (min_ratio, max_ratio) = (ratio(*min)?, ratio(*max)?);
    if min_ratio > max_ratio {
        return Err(format!("min ratio {min_ratio} exceeds max ratio {max_ratio}"));
    }
    Ok(TimingBound {
        nvm: nvm.to_string(),
        baseline: baseline.to_string(),
        min_ratio,
        max_ratio,
    })
}
