//! Markdown reports: run-to-run comparison and alert tables

use std::fmt::Write;
use std::sync::Arc;

use crate::config::{DetectorConfig, Direction};
use crate::detector::Alert;
use crate::error::{Result, TrackerError};
use crate::model::{BenchmarkEntry, Run};
use crate::store::{RunLog, Store};

/// One benchmark of a run next to its value in the previous run
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub name: String,
    pub current: f64,
    pub previous: Option<f64>,
    pub unit: String,
    pub range: Option<String>,
    /// Greater than 1 means worse, whichever the direction
    pub ratio: Option<f64>,
    pub direction: Direction,
}

/// A run compared with the run before it in the same tool log
#[derive(Debug, Clone)]
pub struct Comparison {
    pub tool: String,
    pub current: Arc<Run>,
    pub previous: Option<Arc<Run>>,
    pub rows: Vec<ComparisonRow>,
}

/// Compare run `index` of `log` with run `index - 1`
pub fn compare(log: &RunLog, index: usize, config: &DetectorConfig) -> Option<Comparison> {
    let current = Arc::clone(log.get(index)?);
    let previous = index.checked_sub(1).and_then(|i| log.get(i)).cloned();

    let rows = current
        .representative_entries()
        .map(|(_, entry)| {
            let direction = config.policy_for(log.tool(), &entry.name).direction;
            let previous_value = previous
                .as_ref()
                .and_then(|run| run.entry(&entry.name))
                .map(|e| e.value);
            ComparisonRow {
                name: entry.name.clone(),
                current: entry.value,
                previous: previous_value,
                unit: entry.display_unit().to_string(),
                range: entry.range.clone(),
                ratio: previous_value.and_then(|prev| ratio(entry, prev, direction)),
                direction,
            }
        })
        .collect();

    Some(Comparison {
        tool: log.tool().to_string(),
        current,
        previous,
        rows,
    })
}

/// Compare the latest run of `tool` with the one before it
pub fn compare_latest(store: &Store, tool: &str, config: &DetectorConfig) -> Result<Comparison> {
    let log = store
        .runs(tool)
        .ok_or_else(|| TrackerError::UnknownTool(tool.to_string()))?;
    let last = log
        .len()
        .checked_sub(1)
        .ok_or_else(|| TrackerError::UnknownTool(tool.to_string()))?;
    compare(&log, last, config).ok_or_else(|| TrackerError::RunNotFound {
        tool: tool.to_string(),
        index: last,
    })
}

fn ratio(entry: &BenchmarkEntry, previous: f64, direction: Direction) -> Option<f64> {
    if previous <= 0.0 || entry.value <= 0.0 {
        return None;
    }
    Some(match direction {
        Direction::LowerIsBetter => entry.value / previous,
        Direction::HigherIsBetter => previous / entry.value,
    })
}

fn commit_line(label: &str, run: &Run) -> String {
    let id = run.commit.short_id();
    let link = if run.commit.url.is_empty() {
        format!("`{}`", id)
    } else {
        format!("[`{}`]({})", id, run.commit.url)
    };
    let when = run
        .executed_at()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| run.date.to_string());
    format!("{}: {} {} ({})", label, link, run.commit.summary(), when)
}

fn format_value(value: f64, unit: &str, range: Option<&str>) -> String {
    let mut text = format!("`{}` {}", value, unit);
    if let Some(range) = range {
        let _ = write!(text, " (`{}`)", range);
    }
    text.trim_end().to_string()
}

/// Render a comparison as a markdown table. Rows with an alert are flagged.
pub fn render_markdown(comparison: &Comparison, alerts: &[Alert]) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Benchmark result: {}\n", comparison.tool);
    let _ = writeln!(md, "{}  ", commit_line("Current", &comparison.current));
    match &comparison.previous {
        Some(previous) => {
            let _ = writeln!(md, "{}\n", commit_line("Previous", previous));
        }
        None => md.push_str("Previous: none\n\n"),
    }

    md.push_str("| Benchmark | Current | Previous | Ratio |\n");
    md.push_str("|-|-|-|-|\n");
    for row in &comparison.rows {
        let flagged = alerts.iter().any(|a| a.name == row.name);
        let previous = match row.previous {
            Some(value) => format_value(value, &row.unit, None),
            None => "-".to_string(),
        };
        let ratio = match row.ratio {
            Some(r) if flagged => format!("`{:.2}` :warning:", r),
            Some(r) => format!("`{:.2}`", r),
            None => "-".to_string(),
        };
        let _ = writeln!(
            md,
            "| `{}` | {} | {} | {} |",
            row.name,
            format_value(row.current, &row.unit, row.range.as_deref()),
            previous,
            ratio
        );
    }

    if !alerts.is_empty() {
        md.push('\n');
        md.push_str(&render_alerts_markdown(alerts));
    }
    md
}

/// Render alerts as a markdown table
pub fn render_alerts_markdown(alerts: &[Alert]) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "## Possible regressions ({})\n", alerts.len());
    md.push_str("| Benchmark | Severity | Observed | Baseline | Change | Threshold |\n");
    md.push_str("|-|-|-|-|-|-|\n");
    for alert in alerts {
        let _ = writeln!(
            md,
            "| `{}` | {} | `{}` {} | `{:.2}` (n={}) | {:+.1}% | {:.1}% |",
            alert.name,
            alert.severity,
            alert.observed,
            alert.unit,
            alert.baseline.mean,
            alert.baseline.samples,
            alert.delta_ratio * 100.0,
            alert.threshold_ratio * 100.0
        );
    }
    md
}
