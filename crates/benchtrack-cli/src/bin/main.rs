//! benchtrack CLI
//!
//! # Usage
//!
//! ```bash
//! # Append a run and fail on error-level regressions
//! benchtrack ingest --snapshot dev/bench/data.js --run run.json --fail-on error
//!
//! # Evaluate the latest run of a tool
//! benchtrack check --snapshot dev/bench/data.js --tool "Go Benchmark"
//!
//! # Print one series since a date
//! benchtrack series --snapshot dev/bench/data.js --tool "Go Benchmark" --name BenchmarkX --from 2022-08-01
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success, no regression at or above `--fail-on`
//! - 1: Regression at or above `--fail-on`
//! - 2: Regressions below `--fail-on` only
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 5: Snapshot corrupted
//! - 10: Internal error

use benchtrack_cli::{run_cli, BenchtrackCli};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = BenchtrackCli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
