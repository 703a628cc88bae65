//! benchtrack command-line interface
//!
//! Thin layer over `benchtrack-core`: argument parsing, snapshot file
//! handling, concurrent ingestion, and output rendering.

pub mod cli;

pub use cli::{BenchtrackCli, Commands, ExitCode, OutputFormat};

/// Run the CLI and map failures to exit codes
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use benchtrack_cli::{BenchtrackCli, run_cli};
///
/// fn main() {
///     let cli = BenchtrackCli::parse();
///     let exit_code = run_cli(cli);
///     std::process::exit(exit_code.into());
/// }
/// ```
pub fn run_cli(cli: BenchtrackCli) -> ExitCode {
    match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from_error(&e)
        }
    }
}
