use std::fmt;

use ahash::AHashSet;
use serde::Serialize;

use crate::timing::{TimingBound, TimingRegistry};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RegressionFinding {
    OutOfBounds {
        nvm: String,
        min_ratio: u64,
        max_ratio: u64,
        observed: u64,
    },
    ZeroBaseline {
        nvm: String,
        baseline: String,
    },
}

impl fmt::Display for RegressionFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegressionFinding::OutOfBounds {
                nvm,
                min_ratio,
                max_ratio,
                observed,
            } => write!(
                f,
                "Possible performance regression for {nvm}, (expected ratio between {min_ratio} & {max_ratio}, but found {observed})"
            ),
            RegressionFinding::ZeroBaseline { nvm, baseline } => write!(
                f,
                "Base timing of {baseline} is 0, counting {nvm} as performance regression"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RegressionOutcome {
    Pass,
    Regressed(Vec<RegressionFinding>),
}

impl RegressionOutcome {
    pub fn findings(&self) -> &[RegressionFinding] {
        match self {
            RegressionOutcome::Pass => &[],
            RegressionOutcome::Regressed(findings) => findings,
        }
    }
}

/// Cumulative NVM runtime divided by cumulative baseline runtime, truncated
/// toward zero. `None` when the baseline never accumulated any time.
pub fn ratio(nvm_runtime: u64, baseline_runtime: u64) -> Option<u64> {
    nvm_runtime.checked_div(baseline_runtime)
}

pub fn check_bound(bound: &TimingBound, registry: &TimingRegistry) -> Option<RegressionFinding> {
    let nvm_runtime = registry.runtime(&bound.nvm).unwrap_or(0);
    let baseline_runtime = registry.runtime(&bound.baseline).unwrap_or(0);
    match ratio(nvm_runtime, baseline_runtime) {
        None => Some(RegressionFinding::ZeroBaseline {
            nvm: bound.nvm.clone(),
            baseline: bound.baseline.clone(),
        }),
        Some(observed) if observed < bound.min_ratio || observed > bound.max_ratio => {
            Some(RegressionFinding::OutOfBounds {
                nvm: bound.nvm.clone(),
                min_ratio: bound.min_ratio,
                max_ratio: bound.max_ratio,
                observed,
            })
        }
        Some(_) => None,
    }
}

#[derive(Clone, Debug)]
pub struct RegressionAnalyzer {
    tracked_targets: AHashSet<String>,
}

impl RegressionAnalyzer {
    pub fn new<I, S>(tracked_targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracked_targets: tracked_targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn applies_to(&self, target: &str) -> bool {
        self.tracked_targets.contains(target)
    }

    /// Checks every bound in load order against the cycle's accumulated runtimes.
    pub fn evaluate(&self, registry: &TimingRegistry) -> RegressionOutcome {
        let findings: Vec<_> = registry
            .bounds()
            .iter()
            .filter_map(|bound| check_bound(bound, registry))
            .collect();
        if findings.is_empty() {
            RegressionOutcome::Pass
        } else {
            RegressionOutcome::Regressed(findings)
        }
    }
}
