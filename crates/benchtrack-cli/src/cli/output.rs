//! Output formatting for the benchtrack CLI
//!
//! Every command result renders as JSON, YAML, or a colored table.

use benchtrack_core::{Alert, IngestReport, SeriesPoint, Severity, Store};
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// Results that can be printed as a table
pub trait TableRender {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Render a result in the requested format
pub fn render<T>(value: &T, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()>
where
    T: Serialize + TableRender,
{
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
        OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(value)?)?,
        OutputFormat::Table => value.render_table(out)?,
    }
    Ok(())
}

/// Render to stdout
pub fn print<T>(value: &T, format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + TableRender,
{
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    render(value, format, &mut lock)
}

fn format_date(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn colored_severity(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Warning => "warning".yellow(),
        Severity::Error => "error".red(),
        Severity::Critical => "critical".red().bold(),
    }
}

fn write_alerts(out: &mut dyn Write, alerts: &[Alert]) -> io::Result<()> {
    for alert in alerts {
        writeln!(
            out,
            "  {} {:<48} {:>12} {:<8} baseline {:>12.2}  {:>+7.1}% (limit {:.1}%)",
            colored_severity(alert.severity),
            alert.name,
            alert.observed,
            alert.unit,
            alert.baseline.mean,
            alert.delta_ratio * 100.0,
            alert.threshold_ratio * 100.0
        )?;
    }
    Ok(())
}

/// A skipped raw entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedOutput {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub error: String,
}

/// One ingested run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunOutput {
    pub key: String,
    pub index: usize,
    pub commit: String,
    pub date: i64,
    pub entries: usize,
    pub skipped: Vec<SkippedOutput>,
    pub alerts: Vec<Alert>,
}

/// Result of the ingest command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutput {
    pub snapshot: String,
    pub runs: Vec<IngestRunOutput>,
}

impl IngestOutput {
    pub fn from_reports(snapshot: impl Into<String>, reports: &[IngestReport]) -> Self {
        let runs = reports
            .iter()
            .map(|report| IngestRunOutput {
                key: report.run_ref.tool.clone(),
                index: report.run_ref.index,
                commit: report.run.commit.id.clone(),
                date: report.run.date,
                entries: report.run.benches.len(),
                skipped: report
                    .skipped
                    .iter()
                    .map(|s| SkippedOutput {
                        index: s.index,
                        name: s.name.clone(),
                        error: s.error.to_string(),
                    })
                    .collect(),
                alerts: report.alerts.clone(),
            })
            .collect();
        Self {
            snapshot: snapshot.into(),
            runs,
        }
    }
}

impl TableRender for IngestOutput {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", "Ingested Runs".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        for run in &self.runs {
            let status = if run.alerts.is_empty() { "+".green() } else { "!".red() };
            writeln!(
                out,
                "{} {}#{} @ {} ({}): {} entries, {} skipped, {} alerts",
                status,
                run.key,
                run.index,
                run.commit.get(..7).unwrap_or(&run.commit),
                format_date(run.date),
                run.entries,
                run.skipped.len(),
                run.alerts.len()
            )?;
            for skipped in &run.skipped {
                writeln!(out, "  {} #{}: {}", "skipped".dimmed(), skipped.index, skipped.error)?;
            }
            write_alerts(out, &run.alerts)?;
        }
        writeln!(out)?;
        writeln!(out, "Snapshot written to {}", self.snapshot)?;
        Ok(())
    }
}

/// Result of the check command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsOutput {
    pub tool: String,
    pub alerts: Vec<Alert>,
}

impl TableRender for AlertsOutput {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", format!("Regression Check: {}", self.tool).cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        if self.alerts.is_empty() {
            writeln!(out, "{} No regressions in the latest run", "+".green())?;
        } else {
            writeln!(out, "{} {} regression(s)", "x".red(), self.alerts.len())?;
            write_alerts(out, &self.alerts)?;
        }
        Ok(())
    }
}

/// One point of a series query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointOutput {
    pub run_index: usize,
    pub date: i64,
    pub commit: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

impl From<&SeriesPoint> for PointOutput {
    fn from(point: &SeriesPoint) -> Self {
        let entry = point.entry();
        Self {
            run_index: point.run_index,
            date: point.timestamp(),
            commit: point.commit().id.clone(),
            name: entry.name.clone(),
            value: entry.value,
            unit: entry.display_unit().to_string(),
            extra: entry.extra.clone(),
        }
    }
}

/// Result of the series command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesOutput {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub points: Vec<PointOutput>,
}

impl TableRender for SeriesOutput {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        let title = match &self.name {
            Some(name) => format!("Series: {} / {}", self.tool, name),
            None => format!("Series: {}", self.tool),
        };
        writeln!(out)?;
        writeln!(out, "{}", title.cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(
            out,
            "{:>5}  {:<19}  {:<7}  {:<48}  {:>12}  {}",
            "run", "date", "commit", "benchmark", "value", "unit"
        )?;
        writeln!(out, "{}", "-".repeat(60))?;
        for point in &self.points {
            writeln!(
                out,
                "{:>5}  {:<19}  {:<7}  {:<48}  {:>12}  {}",
                point.run_index,
                format_date(point.date),
                point.commit.get(..7).unwrap_or(&point.commit),
                point.name,
                point.value,
                point.unit
            )?;
        }
        writeln!(out, "{} point(s)", self.points.len())?;
        Ok(())
    }
}

/// Per-tool summary for the inspect command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    pub key: String,
    pub runs: usize,
    pub benchmarks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_date: Option<i64>,
}

/// Result of the inspect command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectOutput {
    pub repo_url: String,
    pub last_update: i64,
    pub total_runs: usize,
    pub tools: Vec<ToolSummary>,
}

impl InspectOutput {
    pub fn from_store(store: &Store) -> Self {
        let tools = store
            .tools()
            .into_iter()
            .filter_map(|key| {
                let log = store.runs(&key)?;
                let latest = log.last();
                Some(ToolSummary {
                    runs: log.len(),
                    benchmarks: log.benchmark_names().len(),
                    latest_commit: latest.map(|run| run.commit.id.clone()),
                    latest_date: latest.map(|run| run.date),
                    key,
                })
            })
            .collect();
        Self {
            repo_url: store.repo_url().to_string(),
            last_update: store.last_update(),
            total_runs: store.run_count(),
            tools,
        }
    }
}

impl TableRender for InspectOutput {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", "Snapshot".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out, "Repository:  {}", self.repo_url)?;
        writeln!(out, "Last update: {}", format_date(self.last_update))?;
        writeln!(out, "Runs:        {}", self.total_runs)?;
        writeln!(out)?;
        writeln!(out, "{:<32} {:>6} {:>11}  {}", "tool", "runs", "benchmarks", "latest")?;
        writeln!(out, "{}", "-".repeat(60))?;
        for tool in &self.tools {
            let latest = match (&tool.latest_commit, tool.latest_date) {
                (Some(commit), Some(date)) => format!(
                    "{} ({})",
                    commit.get(..7).unwrap_or(commit),
                    format_date(date)
                ),
                _ => "-".to_string(),
            };
            writeln!(
                out,
                "{:<32} {:>6} {:>11}  {}",
                tool.key, tool.runs, tool.benchmarks, latest
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchtrack_core::{CommitMeta, RawBench};

    fn store() -> Store {
        let store = Store::new("https://github.com/o/r");
        store
            .append(
                CommitMeta::new("5201f6b753c7e663"),
                "Go Benchmark",
                1_661_223_171_368,
                &[RawBench::new("op", 2217.0).with_unit("ns/op"), RawBench::new("op2", 5.0)],
            )
            .unwrap();
        store
    }

    fn rendered<T: Serialize + TableRender>(value: &T, format: OutputFormat) -> String {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        render(value, format, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_inspect_output() {
        let output = InspectOutput::from_store(&store());
        assert_eq!(output.total_runs, 1);
        assert_eq!(output.tools[0].key, "Go Benchmark");
        assert_eq!(output.tools[0].benchmarks, 2);

        let json: serde_json::Value = serde_json::from_str(&rendered(&output, OutputFormat::Json)).unwrap();
        assert_eq!(json["last_update"], 1_661_223_171_368_i64);
        assert_eq!(json["tools"][0]["latest_commit"], "5201f6b753c7e663");

        let table = rendered(&output, OutputFormat::Table);
        assert!(table.contains("Go Benchmark"));
        assert!(table.contains("5201f6b (2022-08-23 02:52:51)"));
    }

    #[test]
    fn test_series_output_formats() {
        let store = store();
        let log = store.runs("Go Benchmark").unwrap();
        let output = SeriesOutput {
            tool: "Go Benchmark".to_string(),
            name: Some("op".to_string()),
            points: log.series("op").points.iter().map(PointOutput::from).collect(),
        };

        let yaml = rendered(&output, OutputFormat::Yaml);
        assert!(yaml.contains("value: 2217"));
        assert!(yaml.contains("unit: ns/op"));

        let table = rendered(&output, OutputFormat::Table);
        assert!(table.contains("Series: Go Benchmark / op"));
        assert!(table.contains("1 point(s)"));
    }

    #[test]
    fn test_alerts_output_table_without_alerts() {
        let output = AlertsOutput {
            tool: "go".to_string(),
            alerts: Vec::new(),
        };
        assert!(rendered(&output, OutputFormat::Table).contains("No regressions"));
    }
}
