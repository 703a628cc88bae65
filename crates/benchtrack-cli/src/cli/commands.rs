//! CLI command definitions for benchtrack
//!
//! Clap-based commands for ingesting run files, checking the latest run of a
//! tool, querying series, and reporting.

use anyhow::Context;
use benchtrack_core::report::{compare_latest, render_markdown};
use benchtrack_core::{
    read_snapshot, BenchmarkTracker, DetectorConfig, IngestMetrics, IngestReport, RawRun,
    RegressionDetector, Severity, Store, TrackerError,
};
use chrono::{DateTime, NaiveDate};
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::output::{
    print, AlertsOutput, IngestOutput, InspectOutput, OutputFormat, PointOutput, SeriesOutput,
};
use super::ExitCode;

/// Continuous benchmark tracking
///
/// Append benchmark runs to a snapshot, flag regressions against a rolling
/// baseline, and read series back out.
#[derive(Parser, Debug)]
#[command(name = "benchtrack")]
#[command(about = "benchtrack - Track benchmark results and detect regressions", long_about = None)]
#[command(version)]
pub struct BenchtrackCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Append run files to a snapshot and evaluate them
    ///
    /// Each run file holds one run object or an array of them. Runs for
    /// different keys are ingested concurrently; runs for the same key are
    /// appended in argument order.
    Ingest(IngestArgs),

    /// Evaluate the latest run of a tool without appending
    Check(CheckArgs),

    /// Print the points of a series
    Series(SeriesArgs),

    /// Markdown comparison of the latest run with the previous one
    Report(ReportArgs),

    /// Summarize a snapshot
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Snapshot file (`.js` for the script form, anything else for JSON)
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Run files to append
    #[arg(short, long = "run", num_args = 1.., required = true)]
    pub runs: Vec<PathBuf>,

    /// Tool key to file the runs under; defaults to each run's `tool`
    #[arg(short, long)]
    pub key: Option<String>,

    /// Repository URL recorded when the snapshot is created
    #[arg(long, env = "BENCHTRACK_REPO_URL", default_value = "")]
    pub repo_url: String,

    /// Detector config file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Lowest alert severity that fails the command
    #[arg(long, default_value = "warning")]
    pub fail_on: Severity,

    /// Print Prometheus metrics to stderr after ingesting
    #[arg(long)]
    pub metrics: bool,

    /// Output format for ingestion results
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Tool key to check
    #[arg(short, long)]
    pub tool: String,

    /// Detector config file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Lowest alert severity that fails the command
    #[arg(long, default_value = "warning")]
    pub fail_on: Severity,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct SeriesArgs {
    #[arg(short, long)]
    pub snapshot: PathBuf,

    #[arg(short, long)]
    pub tool: String,

    /// Benchmark name; all benchmarks of every run when omitted
    #[arg(short, long)]
    pub name: Option<String>,

    /// Inclusive lower bound: epoch milliseconds, RFC 3339, or YYYY-MM-DD
    #[arg(long, value_parser = parse_time_bound)]
    pub from: Option<i64>,

    /// Inclusive upper bound: epoch milliseconds, RFC 3339, or YYYY-MM-DD
    #[arg(long, value_parser = parse_time_bound)]
    pub to: Option<i64>,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[arg(short, long)]
    pub snapshot: PathBuf,

    #[arg(short, long)]
    pub tool: String,

    /// Detector config file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(short, long)]
    pub snapshot: PathBuf,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Parse a time bound given as epoch milliseconds, RFC 3339, or a UTC date
pub fn parse_time_bound(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.timestamp_millis());
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }
    Err(format!(
        "'{}' is not epoch milliseconds, RFC 3339, or YYYY-MM-DD",
        raw
    ))
}

/// File defaults, then environment overrides
fn load_config(path: Option<&Path>) -> anyhow::Result<DetectorConfig> {
    let config = match path {
        Some(path) => DetectorConfig::from_file(path)?,
        None => DetectorConfig::default(),
    };
    let config = config.with_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn load_store(path: &Path) -> anyhow::Result<Store> {
    let snapshot = read_snapshot(path)?;
    Ok(Store::from_snapshot(snapshot)?)
}

fn require_tool(store: &Store, tool: &str) -> anyhow::Result<()> {
    if store.runs(tool).is_none() {
        return Err(TrackerError::UnknownTool(format!(
            "{} (known: {})",
            tool,
            store.tools().join(", ")
        ))
        .into());
    }
    Ok(())
}

/// Read a run file: one run object or an array of run objects
pub fn load_run_file(path: &Path) -> anyhow::Result<Vec<RawRun>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TrackerError::file_error(format!("Failed to read run file '{}': {}", path.display(), e))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        TrackerError::invalid_input(format!("'{}' is not valid JSON: {}", path.display(), e))
    })?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<RawRun>(item).map_err(|e| {
                anyhow::Error::from(TrackerError::invalid_input(format!(
                    "'{}' run {}: {}",
                    path.display(),
                    i,
                    e
                )))
            })
        })
        .collect()
}

/// Group runs by tool key, keeping argument order within each key
fn group_by_key(
    files: &[PathBuf],
    key: Option<&str>,
) -> anyhow::Result<IndexMap<String, Vec<RawRun>>> {
    let mut batches: IndexMap<String, Vec<RawRun>> = IndexMap::new();
    for path in files {
        for raw in load_run_file(path)? {
            let run_key = key
                .map(str::to_string)
                .or_else(|| raw.tool.clone())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    TrackerError::invalid_input(format!(
                        "a run in '{}' has no tool; pass --key",
                        path.display()
                    ))
                })?;
            batches.entry(run_key).or_default().push(raw);
        }
    }
    Ok(batches)
}

/// One blocking task per key; each appends its runs in order
async fn ingest_concurrently(
    tracker: Arc<BenchmarkTracker>,
    batches: IndexMap<String, Vec<RawRun>>,
) -> anyhow::Result<Vec<IngestReport>> {
    let handles: Vec<_> = batches
        .into_iter()
        .map(|(key, runs)| {
            let tracker = Arc::clone(&tracker);
            tokio::task::spawn_blocking(move || {
                runs.into_iter()
                    .map(|raw| tracker.ingest_run(&key, raw))
                    .collect::<benchtrack_core::Result<Vec<_>>>()
            })
        })
        .collect();

    let mut reports = Vec::new();
    for handle in handles {
        reports.extend(handle.await.context("ingest task failed")??);
    }
    Ok(reports)
}

/// Execute the ingest command
pub fn execute_ingest(args: IngestArgs) -> anyhow::Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let batches = group_by_key(&args.runs, args.key.as_deref())?;

    let mut tracker = BenchmarkTracker::open(&args.snapshot, &args.repo_url, config)?;
    if args.metrics {
        tracker = tracker.with_metrics(IngestMetrics::new()?);
    }
    let tracker = Arc::new(tracker);

    tracing::info!(
        snapshot = %args.snapshot.display(),
        keys = batches.len(),
        "Ingesting runs"
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let reports = runtime.block_on(ingest_concurrently(Arc::clone(&tracker), batches))?;

    tracker.save(&args.snapshot)?;

    let output = IngestOutput::from_reports(args.snapshot.display().to_string(), &reports);
    print(&output, args.format)?;

    if let Some(metrics) = tracker.metrics() {
        eprint!("{}", metrics.encode_text()?);
    }

    let max_severity = reports.iter().filter_map(IngestReport::max_severity).max();
    Ok(ExitCode::from_alerts(max_severity, args.fail_on))
}

/// Execute the check command
pub fn execute_check(args: CheckArgs) -> anyhow::Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let store = load_store(&args.snapshot)?;
    require_tool(&store, &args.tool)?;

    let alerts = RegressionDetector::new(config).evaluate_latest(&store, &args.tool)?;
    let max_severity = alerts.iter().map(|a| a.severity).max();

    print(
        &AlertsOutput {
            tool: args.tool,
            alerts,
        },
        args.format,
    )?;
    Ok(ExitCode::from_alerts(max_severity, args.fail_on))
}

/// Execute the series command
pub fn execute_series(args: SeriesArgs) -> anyhow::Result<ExitCode> {
    let store = Arc::new(load_store(&args.snapshot)?);
    require_tool(&store, &args.tool)?;

    let query = benchtrack_core::QueryService::new(store).read(
        &args.tool,
        args.name.as_deref(),
        args.from,
        args.to,
    );
    let points: Vec<PointOutput> = query.iter().map(|p| PointOutput::from(&p)).collect();

    print(
        &SeriesOutput {
            tool: args.tool,
            name: args.name,
            points,
        },
        args.format,
    )?;
    Ok(ExitCode::Success)
}

/// Execute the report command
pub fn execute_report(args: ReportArgs) -> anyhow::Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let store = load_store(&args.snapshot)?;
    require_tool(&store, &args.tool)?;

    let comparison = compare_latest(&store, &args.tool, &config)?;
    let alerts = RegressionDetector::new(config).evaluate_latest(&store, &args.tool)?;
    let markdown = render_markdown(&comparison, &alerts);

    match &args.output {
        Some(path) => std::fs::write(path, &markdown).map_err(|e| {
            TrackerError::file_error(format!("Failed to write report '{}': {}", path.display(), e))
        })?,
        None => print!("{}", markdown),
    }
    Ok(ExitCode::Success)
}

/// Execute the inspect command
pub fn execute_inspect(args: InspectArgs) -> anyhow::Result<ExitCode> {
    let store = load_store(&args.snapshot)?;
    print(&InspectOutput::from_store(&store), args.format)?;
    Ok(ExitCode::Success)
}
