//! Per-test work of a target cycle: building a target, running a test program
//! twice against its fixture, forcing a crash, and invoking recovery.

use std::{fs, path::Path};

use tracing::{debug, warn};

use crate::{
    HarnessError, compare,
    config::Layout,
    process::{Invocation, ProcessRunner, Redirect},
    report::Reporter,
    timing::{self, MISSING_RUNTIME, TimingRegistry},
};

/// Everything a phase needs to launch processes and report on them.
pub struct Harness<R> {
    pub runner: R,
    pub layout: Layout,
    pub reporter: Reporter,
    pub make_program: String,
}

impl<R: ProcessRunner> Harness<R> {
    pub fn new(runner: R, layout: Layout, reporter: Reporter, make_program: &str) -> Self {
        Self {
            runner,
            layout,
            reporter,
            make_program: make_program.to_string(),
        }
    }

    /// Echoes the command into the detail log, then runs it. Runner errors are
    /// logged and count as an unsuccessful exit.
    fn launch(&mut self, invocation: &Invocation, redirect: &Redirect) -> Result<bool, HarnessError> {
        let echoed = match redirect {
            Redirect::Capture(path) => format!("{} > {}", invocation.display(), path.display()),
            Redirect::Append(_) | Redirect::Discard => invocation.display(),
        };
        self.reporter.headline(&echoed)?;
        match self.runner.run(invocation, redirect) {
            Ok(success) => Ok(success),
            Err(err) => {
                warn!(command = %invocation.display(), error = %err, "process runner failed");
                Ok(false)
            }
        }
    }

    fn make(&mut self, recipe: &str, redirect: Redirect) -> Result<bool, HarnessError> {
        let invocation = Invocation::new(&self.make_program)
            .args(["clean", recipe])
            .current_dir(&self.layout.root);
        self.launch(&invocation, &redirect)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    PreCrash,
    PostRecovery,
}

impl Phase {
    pub fn index(self) -> u32 {
        match self {
            Phase::PreCrash => 0,
            Phase::PostRecovery => 1,
        }
    }

    /// Output-file suffixes of the two runs in this phase.
    pub fn runs(self) -> [u32; 2] {
        let base = 2 * self.index();
        [base, base + 1]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail { reason: String },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

enum SubRun {
    Passed { runtime: u64 },
    Failed { reason: String },
}

/// `make clean <target>`, output appended to the detail log.
pub fn build<R: ProcessRunner>(h: &mut Harness<R>, target: &str) -> Result<bool, HarnessError> {
    let log = h.reporter.log_path().to_path_buf();
    let built = h.make(target, Redirect::Append(log))?;
    if !built {
        warn!(build_target = target, "build failed");
        h.reporter.message("---- Making failed ----")?;
    }
    Ok(built)
}

/// Housekeeping recipes whose status is logged but never judged.
pub fn make_housekeeping<R: ProcessRunner>(
    h: &mut Harness<R>,
    recipe: &str,
    redirect: Redirect,
) -> Result<(), HarnessError> {
    let invocation = Invocation::new(&h.make_program)
        .arg(recipe)
        .current_dir(&h.layout.root);
    let ok = h.launch(&invocation, &redirect)?;
    debug!(recipe, ok, "housekeeping recipe finished");
    Ok(())
}

/// Whitespace-separated arguments from the test's `.in` fixture.
pub fn fixture_args(layout: &Layout, test: &str) -> Result<Vec<String>, HarnessError> {
    let path = layout.input(test);
    let text = fs::read_to_string(&path).map_err(|e| HarnessError::io_at(&path, e))?;
    Ok(text.split_whitespace().map(str::to_string).collect())
}

/// Runs `test` twice for `phase`, stopping at the first failing run. A run
/// passes when the program exits successfully and its output is contained in
/// the reference. Both runtimes are added to `registry` only when both pass.
pub fn run_twice<R: ProcessRunner>(
    h: &mut Harness<R>,
    test: &str,
    target: &str,
    phase: Phase,
    registry: &mut TimingRegistry,
) -> Result<Verdict, HarnessError> {
    let args = match fixture_args(&h.layout, test) {
        Ok(args) => args,
        Err(err) => {
            let reason = err.to_string();
            h.reporter.message(&format!("{test} failed ({reason})"))?;
            return Ok(Verdict::Fail { reason });
        }
    };
    let reference = h.layout.reference(test);
    let mut total = 0u64;
    for run in phase.runs() {
        let output = h.layout.output(test, target, run);
        match run_once(h, test, &args, &reference, &output)? {
            SubRun::Passed { runtime } => total = total.saturating_add(runtime),
            SubRun::Failed { reason } => {
                h.reporter.message(&format!(
                    "{test} failed (Compare {} and {})",
                    reference.display(),
                    output.display()
                ))?;
                debug!(test, build_target = target, run, %reason, "run failed");
                return Ok(Verdict::Fail { reason });
            }
        }
    }
    if registry.accumulate(test, total) {
        debug!(test, build_target = target, runtime = total, "runtime accumulated");
    }
    Ok(Verdict::Pass)
}

fn run_once<R: ProcessRunner>(
    h: &mut Harness<R>,
    test: &str,
    args: &[String],
    reference: &Path,
    output: &Path,
) -> Result<SubRun, HarnessError> {
    let invocation = Invocation::new(h.layout.program(test))
        .args(args.iter().cloned())
        .current_dir(&h.layout.root);
    let exited_ok = h.launch(&invocation, &Redirect::Capture(output.to_path_buf()))?;
    if output.exists() {
        h.reporter.append_file(output)?;
    }
    if !exited_ok {
        return Ok(SubRun::Failed {
            reason: "exited unsuccessfully".to_string(),
        });
    }
    match compare::contains(reference, output) {
        Ok(true) => {}
        Ok(false) => {
            return Ok(SubRun::Failed {
                reason: "output not contained in reference".to_string(),
            });
        }
        Err(err) => {
            return Ok(SubRun::Failed {
                reason: err.to_string(),
            });
        }
    }
    let runtime = match timing::extract_runtime(output) {
        Ok(runtime) => runtime,
        Err(HarnessError::InvalidTiming(msg)) => {
            warn!(test, output = %output.display(), %msg, "unparsable timing, using sentinel");
            MISSING_RUNTIME
        }
        Err(err) => {
            return Ok(SubRun::Failed {
                reason: err.to_string(),
            });
        }
    };
    if let Err(err) = fs::remove_file(output) {
        warn!(output = %output.display(), error = %err, "could not remove verified output");
    }
    Ok(SubRun::Passed { runtime })
}

/// Launches the fault-injecting build of `test`, expecting it to die. Output
/// and exit status are discarded; only the on-disk state it leaves matters.
pub fn run_for_crash<R: ProcessRunner>(h: &mut Harness<R>, test: &str) -> Result<(), HarnessError> {
    let args = fixture_args(&h.layout, test).unwrap_or_else(|err| {
        warn!(test, error = %err, "crash run without fixture arguments");
        Vec::new()
    });
    let invocation = Invocation::new(h.layout.program(test))
        .args(args)
        .current_dir(&h.layout.root);
    let exited_ok = h.launch(&invocation, &Redirect::Discard)?;
    debug!(test, exited_ok, "crash run finished");
    Ok(())
}

/// Runs the recovery tool for `test`; success is its exit status alone.
pub fn recover<R: ProcessRunner>(h: &mut Harness<R>, test: &str) -> Result<bool, HarnessError> {
    let invocation = Invocation::new(&h.layout.recover_tool)
        .arg(test)
        .current_dir(&h.layout.root);
    let log = h.reporter.log_path().to_path_buf();
    let recovered = h.launch(&invocation, &Redirect::Append(log))?;
    if !recovered {
        warn!(test, "recovery failed");
    }
    Ok(recovered)
}
