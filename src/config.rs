//! Harness configuration: which build targets to cycle through, which tests
//! make up the suites, and where fixtures, tools and reports live.
//!
//! The defaults reproduce the layout of the persistence library's source tree,
//! so running the harness from that tree needs no configuration file at all.
//! A JSON file can override any subset of fields; missing fields keep their
//! default values.
//!
//! # Examples
//!
//! ```rust
//! use nvregress::config::HarnessConfig;
//!
//! let cfg = HarnessConfig::from_json(r#"{ "targets": ["flc"], "timeout_secs": 30 }"#).unwrap();
//! assert_eq!(cfg.targets, vec!["flc".to_string()]);
//! assert_eq!(cfg.suite.len(), 8);
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::HarnessError;

/// Environment variable naming a configuration file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "NVREGRESS_CONFIG";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root of the library source tree; every relative path below resolves
    /// against it. Build and recovery commands run with it as working directory.
    pub root_dir: PathBuf,
    /// Directory holding test programs and their `.in`/`.ref` fixtures.
    pub test_dir: PathBuf,
    pub log_file: PathBuf,
    pub summary_file: PathBuf,
    /// Line-oriented `nvm_test baseline_test min_ratio max_ratio` records.
    pub timing_file: PathBuf,
    /// JSON run report; `None` disables it.
    pub report_file: Option<PathBuf>,
    pub make_program: String,
    /// Make recipe producing the fault-injecting build for crash testing.
    pub fault_target: String,
    pub recover_tool: PathBuf,
    pub targets: Vec<String>,
    pub suite: Vec<String>,
    /// Subset of `suite` subjected to forced crash and recovery.
    pub crash_suite: Vec<String>,
    /// Targets whose NVM/baseline timing ratios are checked.
    pub tracked_targets: Vec<String>,
    /// Watchdog for every external process; `None` waits forever.
    pub timeout_secs: Option<u64>,
    /// Exit non-zero when any test failed or regressed.
    pub strict_exit: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            test_dir: PathBuf::from("tests"),
            log_file: PathBuf::from("tests/log"),
            summary_file: PathBuf::from("tests/summary.txt"),
            timing_file: PathBuf::from("tests/timing.txt"),
            report_file: Some(PathBuf::from("tests/report.json")),
            make_program: "make".to_string(),
            fault_target: "force-fail".to_string(),
            recover_tool: PathBuf::from("tools/recover"),
            targets: strings(&[
                "all",
                "use-table-flush",
                "use-movnt",
                "flc",
                "fgc",
                "flc-stats",
                "fgc-stats",
                "stats",
                "disable-flush",
                "disable-flush-stats",
                "flc-disable-flush",
                "fgc-disable-flush",
                "flc-disable-flush-stats",
            ]),
            suite: strings(&[
                "queue_orig",
                "queue_nvm",
                "cow_array_list",
                "cow_array_list_nvm",
                "sll",
                "sll_ll",
                "sll_nvm",
                "tester",
            ]),
            crash_suite: strings(&["queue_nvm", "cow_array_list_nvm", "sll_nvm", "tester"]),
            tracked_targets: strings(&["all", "flc", "fgc", "use-table-flush", "use-movnt"]),
            timeout_secs: None,
            strict_exit: false,
        }
    }
}

impl HarnessConfig {
    pub fn from_json(text: &str) -> Result<Self, HarnessError> {
        let cfg: HarnessConfig =
            serde_json::from_str(text).map_err(|e| HarnessError::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path).map_err(|e| HarnessError::io_at(path, e))?;
        Self::from_json(&text)
    }

    /// Explicit path first, then [`CONFIG_ENV_VAR`], then the built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, HarnessError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.targets.is_empty() {
            return Err(HarnessError::config("at least one target is required"));
        }
        if self.suite.is_empty() {
            return Err(HarnessError::config("test suite must not be empty"));
        }
        if let Some(name) = self.crash_suite.iter().find(|name| !self.suite.contains(name)) {
            return Err(HarnessError::config(format!(
                "crash test {name} is not part of the suite"
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(HarnessError::config("timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Resolves every configured path to an absolute one.
    pub fn layout(&self) -> Result<Layout, HarnessError> {
        let root = if self.root_dir.is_absolute() {
            self.root_dir.clone()
        } else {
            env::current_dir()
                .map_err(|e| HarnessError::io(format!("current directory: {e}")))?
                .join(&self.root_dir)
        };
        Ok(Layout {
            test_dir: root.join(&self.test_dir),
            log_file: root.join(&self.log_file),
            summary_file: root.join(&self.summary_file),
            timing_file: root.join(&self.timing_file),
            report_file: self.report_file.as_ref().map(|p| root.join(p)),
            recover_tool: root.join(&self.recover_tool),
            root,
        })
    }
}

/// Absolute locations derived from a [`HarnessConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub test_dir: PathBuf,
    pub log_file: PathBuf,
    pub summary_file: PathBuf,
    pub timing_file: PathBuf,
    pub report_file: Option<PathBuf>,
    pub recover_tool: PathBuf,
}

impl Layout {
    pub fn program(&self, test: &str) -> PathBuf {
        self.test_dir.join(test)
    }

    pub fn input(&self, test: &str) -> PathBuf {
        self.test_dir.join(format!("{test}.in"))
    }

    pub fn reference(&self, test: &str) -> PathBuf {
        self.test_dir.join(format!("{test}.ref"))
    }

    pub fn output(&self, test: &str, target: &str, run: u32) -> PathBuf {
        self.test_dir.join(format!("{test}.{target}.{run}.out"))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
