mod common;

use std::fs;

use common::{Program, ScriptedRunner, Workspace, default_output};
use nvregress::{
    Phase, Redirect, TimingRegistry, Verdict,
    execution::{self, fixture_args},
    timing::MISSING_RUNTIME,
};

#[test]
fn run_twice_passes_and_accumulates_both_runtimes() {
    let ws = Workspace::new(&["sll_nvm"], &[]);
    let mut h = ws.harness(ScriptedRunner::new());
    let mut registry = TimingRegistry::parse("sll_nvm sll 1 3\n").unwrap();

    let verdict = execution::run_twice(&mut h, "sll_nvm", "flc", Phase::PreCrash, &mut registry)
        .unwrap();

    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(registry.runtime("sll_nvm"), Some(200));
    assert_eq!(registry.runtime("sll"), Some(0));
    let runs = h.runner.calls_to("sll_nvm");
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].args, vec!["4".to_string(), "16".to_string()]);
    assert_eq!(
        runs[1].redirect,
        Redirect::Capture(ws.tests_dir().join("sll_nvm.flc.1.out"))
    );
    assert!(!ws.tests_dir().join("sll_nvm.flc.0.out").exists());
    assert!(!ws.tests_dir().join("sll_nvm.flc.1.out").exists());
    assert!(ws.log().contains("time elapsed 100 us"));
}

#[test]
fn first_failing_run_short_circuits() {
    let ws = Workspace::new(&["queue_nvm"], &[]);
    let mut runner = ScriptedRunner::new();
    runner.script("queue_nvm", vec![Program::failing(&default_output("queue_nvm", 100))]);
    let mut h = ws.harness(runner);
    let mut registry = TimingRegistry::parse("queue_nvm queue_orig 1 3\n").unwrap();

    let verdict = execution::run_twice(&mut h, "queue_nvm", "flc", Phase::PreCrash, &mut registry)
        .unwrap();

    assert!(matches!(verdict, Verdict::Fail { .. }));
    assert_eq!(h.runner.calls_to("queue_nvm").len(), 1);
    assert_eq!(registry.runtime("queue_nvm"), Some(0));
    let out = ws.tests_dir().join("queue_nvm.flc.0.out");
    assert!(out.exists(), "failing output is kept for inspection");
    let summary = ws.summary();
    assert!(summary.contains("queue_nvm failed (Compare"));
    assert!(summary.contains("queue_nvm.ref"));
    assert!(summary.contains("queue_nvm.flc.0.out"));
}

#[test]
fn second_run_failure_accumulates_nothing() {
    let ws = Workspace::new(&["tester"], &[]);
    let mut runner = ScriptedRunner::new();
    runner.script(
        "tester",
        vec![
            Program::ok(&default_output("tester", 100)),
            Program::ok("unexpected line\n"),
        ],
    );
    let mut h = ws.harness(runner);
    let mut registry = TimingRegistry::parse("tester sll 1 3\n").unwrap();

    let verdict =
        execution::run_twice(&mut h, "tester", "flc", Phase::PostRecovery, &mut registry).unwrap();

    assert_eq!(
        verdict,
        Verdict::Fail {
            reason: "output not contained in reference".into()
        }
    );
    assert_eq!(h.runner.calls_to("tester").len(), 2);
    assert_eq!(registry.runtime("tester"), Some(0));
    assert!(ws.tests_dir().join("tester.flc.3.out").exists());
    assert!(!ws.tests_dir().join("tester.flc.2.out").exists());
}

#[test]
fn untracked_test_still_runs() {
    let ws = Workspace::new(&["sll_ll"], &[]);
    let mut h = ws.harness(ScriptedRunner::new());
    let mut registry = TimingRegistry::parse("sll_nvm sll 1 3\n").unwrap();
    let verdict =
        execution::run_twice(&mut h, "sll_ll", "flc", Phase::PreCrash, &mut registry).unwrap();
    assert!(verdict.is_pass());
    assert_eq!(registry.runtime("sll_ll"), None);
}

#[test]
fn missing_timing_line_uses_sentinel() {
    let ws = Workspace::new(&["sll"], &[]);
    ws.write_reference("sll", "sll ok\n");
    let mut runner = ScriptedRunner::new();
    runner.script("sll", vec![Program::ok("sll ok\n")]);
    let mut h = ws.harness(runner);
    let mut registry = TimingRegistry::parse("sll_nvm sll 1 3\n").unwrap();

    let verdict =
        execution::run_twice(&mut h, "sll", "flc", Phase::PreCrash, &mut registry).unwrap();

    assert!(verdict.is_pass());
    assert_eq!(registry.runtime("sll"), Some(2 * MISSING_RUNTIME));
}

#[test]
fn missing_fixture_fails_without_running() {
    let ws = Workspace::new(&["sll"], &[]);
    fs::remove_file(ws.tests_dir().join("sll.in")).unwrap();
    let mut h = ws.harness(ScriptedRunner::new());
    let mut registry = TimingRegistry::new();

    let verdict =
        execution::run_twice(&mut h, "sll", "flc", Phase::PreCrash, &mut registry).unwrap();

    assert!(matches!(verdict, Verdict::Fail { reason } if reason.contains("sll.in")));
    assert!(h.runner.calls.is_empty());
    assert!(fixture_args(&h.layout, "sll").is_err());
}

#[test]
fn crash_run_discards_output_and_always_succeeds() {
    let ws = Workspace::new(&["sll_nvm"], &["sll_nvm"]);
    let mut h = ws.harness(ScriptedRunner::new());
    execution::run_for_crash(&mut h, "sll_nvm").unwrap();
    let calls = h.runner.calls_to("sll_nvm");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].redirect, Redirect::Discard);
    assert!(ws.log().contains("sll_nvm 4 16"));
}

#[test]
fn recovery_is_judged_by_exit_status() {
    let ws = Workspace::new(&["sll_nvm", "tester"], &["sll_nvm", "tester"]);
    let mut runner = ScriptedRunner::new();
    runner.failing_recoveries.insert("tester".into());
    let mut h = ws.harness(runner);
    assert!(execution::recover(&mut h, "sll_nvm").unwrap());
    assert!(!execution::recover(&mut h, "tester").unwrap());
    let calls = h.runner.calls_to("recover");
    assert_eq!(calls[0].args, vec!["sll_nvm".to_string()]);
    assert!(matches!(calls[0].redirect, Redirect::Append(_)));
}

#[test]
fn build_failure_is_announced() {
    let ws = Workspace::new(&["sll"], &[]);
    let mut runner = ScriptedRunner::new();
    runner.failing_builds.insert("force-fail".into());
    let mut h = ws.harness(runner);
    assert!(execution::build(&mut h, "flc").unwrap());
    assert!(!execution::build(&mut h, "force-fail").unwrap());
    assert_eq!(h.runner.builds(), vec!["flc".to_string(), "force-fail".to_string()]);
    assert!(ws.summary().contains("---- Making failed ----"));
    assert!(ws.log().contains("#### make clean flc"));
}
