//! Thin wrapper around external command execution. Every build, test program and
//! recovery tool goes through [`ProcessRunner`], which keeps the orchestration
//! logic free of `std::process` details and lets tests substitute scripted
//! runners. Commands are structured argument lists; no shell is involved.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::HarnessError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Command line as echoed into the detail log.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Where a process's stdout and stderr go. Both streams always share a destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redirect {
    /// Fresh file, truncated before the run.
    Capture(PathBuf),
    Append(PathBuf),
    Discard,
}

impl Redirect {
    fn open(&self) -> Result<(Stdio, Stdio), HarnessError> {
        match self {
            Redirect::Capture(path) => {
                let file = File::create(path).map_err(|e| HarnessError::io_at(path, e))?;
                split(file, path)
            }
            Redirect::Append(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| HarnessError::io_at(path, e))?;
                split(file, path)
            }
            Redirect::Discard => Ok((Stdio::null(), Stdio::null())),
        }
    }
}

fn split(file: File, path: &Path) -> Result<(Stdio, Stdio), HarnessError> {
    let err = file.try_clone().map_err(|e| HarnessError::io_at(path, e))?;
    Ok((Stdio::from(file), Stdio::from(err)))
}

pub trait ProcessRunner {
    /// Runs the invocation to completion and reports whether it exited successfully.
    /// A program that cannot be started counts as an unsuccessful exit.
    fn run(&mut self, invocation: &Invocation, redirect: &Redirect) -> Result<bool, HarnessError>;
}

#[derive(Clone, Debug, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation, redirect: &Redirect) -> Result<bool, HarnessError> {
        let (stdout, stderr) = redirect.open()?;
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }
        debug!(command = %invocation.display(), "spawning");
        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %invocation.display(), error = %err, "failed to start process");
                return Ok(false);
            }
        };
        wait_for(child, self.timeout, invocation)
    }
}

fn wait_for(
    mut child: Child,
    timeout: Option<Duration>,
    invocation: &Invocation,
) -> Result<bool, HarnessError> {
    let wait_err = |e: std::io::Error| HarnessError::process(format!("{}: {e}", invocation.display()));
    let Some(limit) = timeout else {
        return child.wait().map(|status| status.success()).map_err(wait_err);
    };
    let started = Instant::now();
    loop {
        match child.try_wait().map_err(wait_err)? {
            Some(status) => return Ok(status.success()),
            None if started.elapsed() >= limit => {
                warn!(
                    command = %invocation.display(),
                    timeout_secs = limit.as_secs(),
                    "watchdog expired, killing process"
                );
                // The child may exit between try_wait and kill.
                let _ = child.kill();
                child.wait().map_err(wait_err)?;
                return Ok(false);
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}
