// src/main.rs

use dagpool::{cli, logging, run};

fn main() {
    match run_main() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("dagpool error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every task succeeded.
fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    let summary = run(args)?;
    for (task, cause) in &summary.failed {
        eprintln!("task '{task}' failed: {cause}");
    }
    Ok(summary.success())
}
