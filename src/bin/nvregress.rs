use std::{env, process};

use nvregress::{
    CommandLineConfig, CycleController, Harness, HarnessConfig, HarnessError, SystemRunner,
    report::Reporter,
};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let cli = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            eprint!("{}", CommandLineConfig::help());
            process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match HarnessConfig::resolve(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };

    match run(&cli, &config) {
        Ok(failed) if failed && config.strict_exit => process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("harness aborted: {err}");
            process::exit(1);
        }
    }
}

/// Returns whether any test failed or regressed.
fn run(cli: &CommandLineConfig, config: &HarnessConfig) -> Result<bool, HarnessError> {
    let layout = config.layout()?;
    let reporter = Reporter::create(&layout.log_file, &layout.summary_file, true)?;
    let runner = SystemRunner::new(config.timeout());
    let harness = Harness::new(runner, layout, reporter, &config.make_program);
    let mut controller = CycleController::new(config.clone(), harness);
    let counters = controller.run(cli.mode)?;
    Ok(counters.failed > 0 || counters.regressions > 0)
}
