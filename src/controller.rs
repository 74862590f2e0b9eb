//! Target cycle state machine. Each target walks the same fixed sequence of
//! states; every outcome lands in the cycle's counters, which are merged into
//! the run-wide totals once the cycle finishes.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    HarnessError,
    cli::RunMode,
    config::HarnessConfig,
    execution::{self, Harness, Phase},
    process::{ProcessRunner, Redirect},
    regression::{RegressionAnalyzer, RegressionFinding},
    report::{self, HarnessReport, SEPARATOR, TargetSummary},
    timing::TimingRegistry,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub passed: u64,
    pub failed: u64,
    pub regressions: u64,
}

impl Counters {
    pub fn record(&mut self, passed: bool) {
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn fail_all(&mut self, count: usize) {
        self.failed += count as u64;
    }

    pub fn merge(&mut self, other: &Counters) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.regressions += other.regressions;
    }

    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    SeedTiming,
    BuildNormal,
    RunSuite,
    BuildRecovery,
    CrashAndRecover,
    BuildNormalAgain,
    RerunSuite,
    AnalyzeRegression,
    Done,
}

impl CycleState {
    pub fn next(self) -> Self {
        match self {
            CycleState::SeedTiming => CycleState::BuildNormal,
            CycleState::BuildNormal => CycleState::RunSuite,
            CycleState::RunSuite => CycleState::BuildRecovery,
            CycleState::BuildRecovery => CycleState::CrashAndRecover,
            CycleState::CrashAndRecover => CycleState::BuildNormalAgain,
            CycleState::BuildNormalAgain => CycleState::RerunSuite,
            CycleState::RerunSuite => CycleState::AnalyzeRegression,
            CycleState::AnalyzeRegression | CycleState::Done => CycleState::Done,
        }
    }
}

pub struct CycleController<R> {
    harness: Harness<R>,
    config: HarnessConfig,
    analyzer: RegressionAnalyzer,
    counters: Counters,
    summaries: Vec<TargetSummary>,
}

impl<R: ProcessRunner> CycleController<R> {
    pub fn new(config: HarnessConfig, harness: Harness<R>) -> Self {
        let analyzer = RegressionAnalyzer::new(config.tracked_targets.iter().cloned());
        Self {
            harness,
            config,
            analyzer,
            counters: Counters::default(),
            summaries: Vec::new(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn summaries(&self) -> &[TargetSummary] {
        &self.summaries
    }

    pub fn harness(&self) -> &Harness<R> {
        &self.harness
    }

    /// Prologue, one cycle per target (only the first in quick mode), epilogue.
    pub fn run(&mut self, mode: RunMode) -> Result<Counters, HarnessError> {
        self.prologue()?;
        let targets = self.config.targets.clone();
        for target in &targets {
            let summary = self.run_target(target)?;
            self.summaries.push(summary);
            if mode == RunMode::Quick {
                break;
            }
        }
        self.epilogue(mode)?;
        Ok(self.counters)
    }

    fn prologue(&mut self) -> Result<(), HarnessError> {
        let layout = &self.harness.layout;
        let removed = report::clean_previous_run(&layout.log_file, &layout.test_dir)?;
        debug!(removed, "cleaned previous outputs");
        if !layout.timing_file.exists() {
            warn!(path = %layout.timing_file.display(), "timing bounds file missing, regression analysis disabled");
        }
        let reporter = &mut self.harness.reporter;
        reporter.message(&format!("nvregress version {}", env!("CARGO_PKG_VERSION")))?;
        reporter.message("Cleaning memory")?;
        let log = reporter.log_path().to_path_buf();
        execution::make_housekeeping(&mut self.harness, "clean_memory", Redirect::Append(log))
    }

    fn epilogue(&mut self, mode: RunMode) -> Result<(), HarnessError> {
        execution::make_housekeeping(&mut self.harness, "clean", Redirect::Discard)?;
        let c = self.counters;
        let test_dir = self.harness.layout.test_dir.display().to_string();
        let reporter = &mut self.harness.reporter;
        reporter.message("-----------------------")?;
        reporter.message(&format!("Total number of tests: {}", c.total()))?;
        reporter.message(&format!("Number of tests passed: {}", c.passed))?;
        reporter.message(&format!("Number of tests failed: {}", c.failed))?;
        reporter.message(&format!(
            "Number of possible performance regressions: {}",
            c.regressions
        ))?;
        reporter.message("-----------------------")?;
        reporter.message(&format!(
            "See summary.txt, log, and *.out files in {test_dir} for further details"
        ))?;
        if let Some(path) = &self.harness.layout.report_file {
            let report = HarnessReport {
                mode,
                counters: c,
                targets: self.summaries.clone(),
            };
            report::write_report(path, &report)?;
        }
        info!(passed = c.passed, failed = c.failed, regressions = c.regressions, "run complete");
        Ok(())
    }

    /// Walks one target through every cycle state and merges its counters.
    pub fn run_target(&mut self, target: &str) -> Result<TargetSummary, HarnessError> {
        let h = &mut self.harness;
        let cfg = &self.config;
        let mut cycle = Counters::default();
        let mut registry = TimingRegistry::new();
        let mut findings = Vec::new();
        let mut built = false;

        h.reporter.message(SEPARATOR)?;
        h.reporter
            .message(&format!("---- Making and testing target {target} ----"))?;

        let mut state = CycleState::SeedTiming;
        while state != CycleState::Done {
            debug!(build_target = target, ?state, "entering state");
            match state {
                CycleState::SeedTiming => {
                    registry = seed_timing(h);
                }
                CycleState::BuildNormal | CycleState::BuildNormalAgain => {
                    if state == CycleState::BuildNormalAgain {
                        h.reporter
                            .message("---- Retesting after crash/recovery testing ----")?;
                    }
                    built = execution::build(h, target)?;
                    if !built {
                        cycle.fail_all(cfg.suite.len());
                    }
                }
                CycleState::RunSuite if built => {
                    run_suite(h, &cfg.suite, target, Phase::PreCrash, &mut registry, &mut cycle)?;
                }
                CycleState::RerunSuite if built => {
                    run_suite(h, &cfg.suite, target, Phase::PostRecovery, &mut registry, &mut cycle)?;
                }
                CycleState::RunSuite | CycleState::RerunSuite => {
                    debug!(build_target = target, "suite skipped after failed build");
                }
                CycleState::BuildRecovery => {
                    h.reporter
                        .message("---- Performing crash/recovery testing ----")?;
                    built = execution::build(h, &cfg.fault_target)?;
                    if !built {
                        cycle.fail_all(cfg.crash_suite.len());
                    }
                }
                CycleState::CrashAndRecover if built => {
                    crash_and_recover(h, &cfg.crash_suite, &mut cycle)?;
                }
                CycleState::CrashAndRecover => {
                    debug!(build_target = target, "crash phase skipped after failed build");
                }
                CycleState::AnalyzeRegression => {
                    if self.analyzer.applies_to(target) {
                        findings = self.analyzer.evaluate(&registry).findings().to_vec();
                        report_findings(h, &findings, &mut cycle)?;
                    }
                }
                CycleState::Done => {}
            }
            state = state.next();
        }
        registry.clear();

        self.counters.merge(&cycle);
        info!(
            build_target = target,
            passed = cycle.passed,
            failed = cycle.failed,
            regressions = cycle.regressions,
            "target cycle finished"
        );
        Ok(TargetSummary {
            target: target.to_string(),
            passed: cycle.passed,
            failed: cycle.failed,
            regressions: findings.iter().map(ToString::to_string).collect(),
        })
    }
}

fn seed_timing<R: ProcessRunner>(h: &Harness<R>) -> TimingRegistry {
    match TimingRegistry::load(&h.layout.timing_file) {
        Ok(registry) => registry,
        Err(err) => {
            warn!(error = %err, "timing bounds not loaded, cycle runs untimed");
            TimingRegistry::new()
        }
    }
}

/// Each test passes only if its recovery pre-clean (phase 0 only) and its
/// double run both succeed.
fn run_suite<R: ProcessRunner>(
    h: &mut Harness<R>,
    suite: &[String],
    target: &str,
    phase: Phase,
    registry: &mut TimingRegistry,
    cycle: &mut Counters,
) -> Result<(), HarnessError> {
    for test in suite {
        let recovered = match phase {
            Phase::PreCrash => execution::recover(h, test)?,
            Phase::PostRecovery => true,
        };
        let verdict = execution::run_twice(h, test, target, phase, registry)?;
        let passed = recovered && verdict.is_pass();
        if passed {
            h.reporter.message(&format!("{test} passed"))?;
        } else if !recovered {
            h.reporter
                .message(&format!("{test} failed recovery before testing"))?;
        }
        cycle.record(passed);
    }
    Ok(())
}

fn crash_and_recover<R: ProcessRunner>(
    h: &mut Harness<R>,
    crash_suite: &[String],
    cycle: &mut Counters,
) -> Result<(), HarnessError> {
    for test in crash_suite {
        execution::run_for_crash(h, test)?;
        let recovered = execution::recover(h, test)?;
        let msg = if recovered {
            format!("{test} passed crash/recovery")
        } else {
            format!("{test} failed crash/recovery")
        };
        h.reporter.message(&msg)?;
        cycle.record(recovered);
    }
    Ok(())
}

fn report_findings<R: ProcessRunner>(
    h: &mut Harness<R>,
    findings: &[RegressionFinding],
    cycle: &mut Counters,
) -> Result<(), HarnessError> {
    for finding in findings {
        if matches!(finding, RegressionFinding::ZeroBaseline { .. }) {
            warn!(%finding, "baseline runtime is zero");
        }
        h.reporter.message(&finding.to_string())?;
        cycle.regressions += 1;
    }
    Ok(())
}
