#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use nvregress::{
    Harness, HarnessConfig, HarnessError, Invocation, ProcessRunner, Redirect, report::Reporter,
};
use tempfile::TempDir;

/// Behaviour of one scripted test program run.
#[derive(Clone, Debug)]
pub struct Program {
    pub exit_ok: bool,
    pub output: String,
}

impl Program {
    pub fn ok(output: &str) -> Self {
        Self {
            exit_ok: true,
            output: output.to_string(),
        }
    }

    pub fn failing(output: &str) -> Self {
        Self {
            exit_ok: false,
            output: output.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub redirect: Redirect,
}

/// Stands in for make, the recovery tool and every test program.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    pub calls: Vec<Call>,
    pub failing_builds: HashSet<String>,
    pub failing_recoveries: HashSet<String>,
    /// Per-test scripts; the nth run uses entry n, or the last entry once exhausted.
    pub programs: HashMap<String, Vec<Program>>,
    runs: HashMap<String, usize>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&mut self, test: &str, runs: Vec<Program>) {
        self.programs.insert(test.to_string(), runs);
    }

    pub fn calls_to(&self, program: &str) -> Vec<&Call> {
        self.calls.iter().filter(|c| c.program == program).collect()
    }

    pub fn builds(&self) -> Vec<String> {
        self.calls_to("make")
            .into_iter()
            .filter(|c| c.args.len() == 2 && c.args[0] == "clean")
            .map(|c| c.args[1].clone())
            .collect()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&mut self, invocation: &Invocation, redirect: &Redirect) -> Result<bool, HarnessError> {
        let program = invocation
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.push(Call {
            program: program.clone(),
            args: invocation.args.clone(),
            redirect: redirect.clone(),
        });
        match program.as_str() {
            "make" => {
                let recipe = invocation.args.last().cloned().unwrap_or_default();
                Ok(!self.failing_builds.contains(&recipe))
            }
            "recover" => {
                let test = invocation.args.first().cloned().unwrap_or_default();
                Ok(!self.failing_recoveries.contains(&test))
            }
            test => match redirect {
                Redirect::Discard => Ok(false),
                Redirect::Capture(path) | Redirect::Append(path) => {
                    let n = self.runs.entry(test.to_string()).or_insert(0);
                    let script = self
                        .programs
                        .get(test)
                        .and_then(|runs| runs.get(*n).or_else(|| runs.last()))
                        .cloned()
                        .unwrap_or_else(|| Program::ok(&default_output(test, 100)));
                    *n += 1;
                    fs::write(path, &script.output)
                        .map_err(|e| HarnessError::io(e.to_string()))?;
                    Ok(script.exit_ok)
                }
            },
        }
    }
}

pub fn default_output(test: &str, runtime: u64) -> String {
    format!("{test} ok\ntime elapsed {runtime} us\n")
}

/// Temporary source tree with fixtures for every suite test.
pub struct Workspace {
    pub dir: TempDir,
    pub config: HarnessConfig,
}

impl Workspace {
    pub fn new(suite: &[&str], crash_suite: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let tests = dir.path().join("tests");
        fs::create_dir_all(&tests).expect("tests dir");
        for test in suite {
            fs::write(tests.join(format!("{test}.in")), "4 16\n").expect("in");
            fs::write(tests.join(format!("{test}.ref")), default_reference(test))
                .expect("ref");
        }
        let config = HarnessConfig {
            root_dir: dir.path().to_path_buf(),
            targets: vec!["flc".into(), "fgc-stats".into()],
            suite: suite.iter().map(|s| s.to_string()).collect(),
            crash_suite: crash_suite.iter().map(|s| s.to_string()).collect(),
            tracked_targets: vec!["flc".into()],
            ..HarnessConfig::default()
        };
        Self { dir, config }
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.dir.path().join("tests")
    }

    pub fn write_timing(&self, text: &str) {
        fs::write(self.tests_dir().join("timing.txt"), text).expect("timing");
    }

    pub fn write_reference(&self, test: &str, text: &str) {
        fs::write(self.tests_dir().join(format!("{test}.ref")), text).expect("ref");
    }

    pub fn harness(&self, runner: ScriptedRunner) -> Harness<ScriptedRunner> {
        let layout = self.config.layout().expect("layout");
        let reporter =
            Reporter::create(&layout.log_file, &layout.summary_file, false).expect("reporter");
        Harness::new(runner, layout, reporter, &self.config.make_program)
    }

    pub fn summary(&self) -> String {
        read(&self.tests_dir().join("summary.txt"))
    }

    pub fn log(&self) -> String {
        read(&self.tests_dir().join("log"))
    }
}

/// Reference lines cover the scripted output, including the timing line.
pub fn default_reference(test: &str) -> String {
    format!("{}expected extra line\n", default_output(test, 100))
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}
