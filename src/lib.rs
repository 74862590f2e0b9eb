//! Regression harness for the build targets of an NVM persistence library.
//! Each target is built, its test suite run twice per program, crash-tested,
//! recovered and re-tested, and NVM/baseline runtime ratios are checked.

pub mod cli;
pub mod compare;
pub mod config;
pub mod controller;
pub mod errors;
pub mod execution;
pub mod process;
pub mod regression;
pub mod report;
pub mod timing;

pub use crate::cli::{CommandLineConfig, RunMode};
pub use crate::config::{HarnessConfig, Layout};
pub use crate::controller::{Counters, CycleController, CycleState};
pub use crate::errors::HarnessError;
pub use crate::execution::{Harness, Phase, Verdict};
pub use crate::process::{Invocation, ProcessRunner, Redirect, SystemRunner};
pub use crate::regression::{RegressionAnalyzer, RegressionFinding, RegressionOutcome};
pub use crate::timing::{TimingBound, TimingRegistry};
