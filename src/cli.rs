use std::path::PathBuf;

use serde::Serialize;

use crate::HarnessError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunMode {
    /// Only the first configured target.
    Quick,
    Full,
}

impl RunMode {
    pub fn from_arg(arg: &str) -> Self {
        if arg.contains("quick") {
            RunMode::Quick
        } else {
            RunMode::Full
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub mode: RunMode,
    pub config: Option<PathBuf>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, HarnessError> {
        let mut mode = None;
        let mut config = None;
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--config" => {
                    config = Some(PathBuf::from(
                        iter.next()
                            .ok_or_else(|| HarnessError::usage("--config requires a value"))?,
                    ));
                }
                other if other.starts_with('-') => {
                    return Err(HarnessError::usage(format!("unknown flag {other}")));
                }
                other => {
                    if mode.is_some() {
                        return Err(HarnessError::usage(format!(
                            "unexpected argument {other}, specify exactly one mode"
                        )));
                    }
                    mode = Some(RunMode::from_arg(other));
                }
            }
        }
        let mode = mode.ok_or_else(|| HarnessError::usage("specify a mode"))?;
        Ok(Self { mode, config })
    }

    pub fn help() -> &'static str {
        "Usage: nvregress <quick|full> [--config PATH]\n"
    }
}
