//! CLI module for benchtrack
//!
//! Ingests run files into a snapshot, evaluates regressions, and reads series
//! back out of a snapshot.

pub mod commands;
pub mod output;

pub use commands::{BenchtrackCli, Commands};
pub use output::OutputFormat;

use benchtrack_core::{Severity, TrackerError};

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution, no regression at or above the fail level
    Success = 0,
    /// Regressions at or above the fail level
    RegressionDetected = 1,
    /// Regressions below the fail level only
    RegressionWarning = 2,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// The snapshot could not be trusted
    SnapshotCorrupted = 5,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Exit code for the highest alert severity seen
    pub fn from_alerts(max_severity: Option<Severity>, fail_on: Severity) -> Self {
        match max_severity {
            Some(severity) if severity >= fail_on => ExitCode::RegressionDetected,
            Some(_) => ExitCode::RegressionWarning,
            None => ExitCode::Success,
        }
    }

    /// Exit code for a failed command
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<TrackerError>() {
            Some(e) if e.is_fatal() => ExitCode::SnapshotCorrupted,
            Some(TrackerError::FileError(_)) => ExitCode::FileError,
            Some(e) if e.is_user_error() => ExitCode::InvalidInput,
            _ => ExitCode::InternalError,
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub fn run(cli: BenchtrackCli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Ingest(args) => commands::execute_ingest(args),
        Commands::Check(args) => commands::execute_check(args),
        Commands::Series(args) => commands::execute_series(args),
        Commands::Report(args) => commands::execute_report(args),
        Commands::Inspect(args) => commands::execute_inspect(args),
    }
}
