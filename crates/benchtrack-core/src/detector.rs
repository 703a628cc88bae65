//! Regression detection against a rolling baseline
//!
//! A candidate run is compared, entry by entry, with the mean of the most
//! recent samples of the same series that precede it in the tool log.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{DetectorConfig, Direction};
use crate::error::{Result, TrackerError};
use crate::model::RunRef;
use crate::store::{RunLog, Store};

/// How far past its threshold a series moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Up to twice the tolerated worsening
    Warning,
    /// Up to four times the tolerated worsening
    Error,
    /// More than four times the tolerated worsening
    Critical,
}

impl Severity {
    /// Classify `exceedance = |delta| / threshold`
    pub fn from_exceedance(exceedance: f64) -> Self {
        if exceedance <= 2.0 {
            Severity::Warning
        } else if exceedance <= 4.0 {
            Severity::Error
        } else {
            Severity::Critical
        }
    }

    pub fn all() -> [Severity; 3] {
        [Severity::Warning, Severity::Error, Severity::Critical]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Summary of the baseline window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineStat {
    pub mean: f64,
    /// Population standard deviation of the window
    pub stddev: f64,
    pub samples: usize,
}

impl BaselineStat {
    /// Compute over a non-empty window
    pub fn from_samples(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            stddev: variance.sqrt(),
            samples: values.len(),
        })
    }
}

/// A detected regression. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub tool: String,
    pub name: String,
    pub run_ref: RunRef,
    pub commit_id: String,
    /// Run execution time, epoch milliseconds
    pub date: i64,
    pub baseline: BaselineStat,
    pub observed: f64,
    /// Display unit of the observed value
    pub unit: String,
    /// Signed `(observed - baseline) / baseline`
    pub delta_ratio: f64,
    pub threshold_ratio: f64,
    pub direction: Direction,
    pub severity: Severity,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{}: {} {} vs baseline {:.2} ({:+.1}%, threshold {:.1}%) at {}",
            self.severity,
            self.tool,
            self.name,
            self.observed,
            self.unit,
            self.baseline.mean,
            self.delta_ratio * 100.0,
            self.threshold_ratio * 100.0,
            self.run_ref
        )
    }
}

/// Evaluates runs against their series baselines
#[derive(Debug, Clone, Default)]
pub struct RegressionDetector {
    config: DetectorConfig,
}

impl RegressionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Evaluate the referenced run. Output follows the run's entry order.
    pub fn evaluate(&self, store: &Store, run_ref: &RunRef) -> Result<Vec<Alert>> {
        let log = store
            .runs(&run_ref.tool)
            .ok_or_else(|| TrackerError::UnknownTool(run_ref.tool.clone()))?;
        if run_ref.index >= log.len() {
            return Err(TrackerError::RunNotFound {
                tool: run_ref.tool.clone(),
                index: run_ref.index,
            });
        }
        Ok(self.evaluate_in(&log, run_ref.index))
    }

    /// Evaluate the most recent run of a tool
    pub fn evaluate_latest(&self, store: &Store, tool: &str) -> Result<Vec<Alert>> {
        let log = store
            .runs(tool)
            .ok_or_else(|| TrackerError::UnknownTool(tool.to_string()))?;
        match log.len() {
            0 => Ok(Vec::new()),
            len => Ok(self.evaluate_in(&log, len - 1)),
        }
    }

    /// Evaluate run `index` of a frozen log. Only runs before `index` feed
    /// the baseline.
    pub fn evaluate_in(&self, log: &RunLog, index: usize) -> Vec<Alert> {
        let Some(run) = log.get(index) else {
            return Vec::new();
        };
        let run_ref = RunRef::new(log.tool(), index);
        let mut alerts = Vec::new();

        for (_, entry) in run.representative_entries() {
            let prior: Vec<f64> = log.points_before(&entry.name, index).map(|p| p.value()).collect();
            if prior.len() < self.config.min_history {
                tracing::debug!(
                    tool = log.tool(),
                    entry = %entry.name,
                    history = prior.len(),
                    required = self.config.min_history,
                    "Cold start, not evaluated"
                );
                continue;
            }

            let window = &prior[prior.len().saturating_sub(self.config.window)..];
            let Some(baseline) = BaselineStat::from_samples(window) else {
                continue;
            };
            if !baseline.mean.is_finite() || baseline.mean <= 0.0 {
                tracing::debug!(
                    tool = log.tool(),
                    entry = %entry.name,
                    baseline = baseline.mean,
                    "Baseline not positive, not evaluated"
                );
                continue;
            }

            let policy = self.config.policy_for(log.tool(), &entry.name);
            let t = policy.threshold_ratio;
            let observed = entry.value;
            let regressed = match policy.direction {
                Direction::LowerIsBetter => observed > baseline.mean * (1.0 + t),
                Direction::HigherIsBetter => observed < baseline.mean * (1.0 - t),
            };
            if !regressed {
                continue;
            }

            let delta_ratio = (observed - baseline.mean) / baseline.mean;
            let exceedance = if t > 0.0 {
                delta_ratio.abs() / t
            } else {
                f64::INFINITY
            };
            let alert = Alert {
                tool: log.tool().to_string(),
                name: entry.name.clone(),
                run_ref: run_ref.clone(),
                commit_id: run.commit.id.clone(),
                date: run.date,
                baseline,
                observed,
                unit: entry.display_unit().to_string(),
                delta_ratio,
                threshold_ratio: t,
                direction: policy.direction,
                severity: Severity::from_exceedance(exceedance),
            };
            tracing::info!(
                tool = %alert.tool,
                entry = %alert.name,
                severity = %alert.severity,
                observed,
                baseline = baseline.mean,
                "Regression detected"
            );
            alerts.push(alert);
        }

        alerts
    }
}
