//! Ingestion facade: append, evaluate, record metrics

use std::path::Path;
use std::sync::Arc;

use crate::config::DetectorConfig;
use crate::detector::{Alert, RegressionDetector, Severity};
use crate::error::Result;
use crate::model::{CommitMeta, Run, RunRef};
use crate::normalize::{RawRecord, SkippedEntry};
use crate::query::QueryService;
use crate::snapshot::{read_snapshot_if_exists, write_snapshot};
use crate::store::{AppendOutcome, RawRun, Store};
use crate::telemetry::IngestMetrics;

/// Result of ingesting one run
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub run_ref: RunRef,
    pub run: Arc<Run>,
    pub skipped: Vec<SkippedEntry>,
    pub alerts: Vec<Alert>,
}

impl IngestReport {
    /// Highest alert severity, if any alert was raised
    pub fn max_severity(&self) -> Option<Severity> {
        self.alerts.iter().map(|a| a.severity).max()
    }

    /// Whether any alert reaches `severity`
    pub fn has_alerts_at(&self, severity: Severity) -> bool {
        self.alerts.iter().any(|a| a.severity >= severity)
    }
}

/// Owns a shared store and evaluates every run right after it is appended
#[derive(Debug, Clone)]
pub struct BenchmarkTracker {
    store: Arc<Store>,
    detector: RegressionDetector,
    metrics: Option<IngestMetrics>,
}

impl BenchmarkTracker {
    pub fn new(store: Arc<Store>, config: DetectorConfig) -> Self {
        Self {
            store,
            detector: RegressionDetector::new(config),
            metrics: None,
        }
    }

    /// Load the snapshot at `path`, or start an empty store for `repo_url`
    /// when the file does not exist yet.
    pub fn open(path: &Path, repo_url: &str, config: DetectorConfig) -> Result<Self> {
        let store = match read_snapshot_if_exists(path)? {
            Some(snapshot) => Store::from_snapshot(snapshot)?,
            None => {
                tracing::info!(path = %path.display(), "No snapshot yet, starting empty");
                Store::new(repo_url)
            }
        };
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn with_metrics(mut self, metrics: IngestMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn detector(&self) -> &RegressionDetector {
        &self.detector
    }

    pub fn metrics(&self) -> Option<&IngestMetrics> {
        self.metrics.as_ref()
    }

    pub fn query(&self) -> QueryService {
        QueryService::new(Arc::clone(&self.store))
    }

    /// Append a run under `tool` and evaluate it
    pub fn ingest<R: RawRecord>(
        &self,
        commit: CommitMeta,
        tool: &str,
        date: i64,
        raw_entries: &[R],
    ) -> Result<IngestReport> {
        let _timer = self.metrics.as_ref().map(|m| m.start_timer(tool));
        let outcome = self.store.append(commit, tool, date, raw_entries)?;
        self.evaluate_outcome(outcome)
    }

    /// Append a pre-parsed run under `key` and evaluate it
    pub fn ingest_run(&self, key: &str, raw: RawRun) -> Result<IngestReport> {
        let _timer = self.metrics.as_ref().map(|m| m.start_timer(key));
        let outcome = self.store.append_run(key, raw)?;
        self.evaluate_outcome(outcome)
    }

    fn evaluate_outcome(&self, outcome: AppendOutcome) -> Result<IngestReport> {
        let alerts = self.detector.evaluate(&self.store, &outcome.run_ref)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_append(&outcome.run_ref.tool, outcome.skipped.len());
            metrics.record_alerts(&alerts);
        }
        Ok(IngestReport {
            run_ref: outcome.run_ref,
            run: outcome.run,
            skipped: outcome.skipped,
            alerts,
        })
    }

    /// Evaluate the latest run of `tool` without appending
    pub fn check(&self, tool: &str) -> Result<Vec<Alert>> {
        self.detector.evaluate_latest(&self.store, tool)
    }

    /// Write the current state to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        write_snapshot(path, &self.store.dump())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::RawBench;
    use serde_json::json;
    use tempfile::TempDir;

    fn tracker() -> BenchmarkTracker {
        let config = DetectorConfig::builder()
            .window(3)
            .threshold_ratio(0.2)
            .build()
            .unwrap();
        BenchmarkTracker::new(Arc::new(Store::new("repo")), config)
            .with_metrics(IngestMetrics::new().unwrap())
    }

    #[test]
    fn test_ingest_evaluates_and_records_metrics() {
        let tracker = tracker();
        for (i, v) in [2200.0, 2150.0, 2180.0].into_iter().enumerate() {
            let report = tracker
                .ingest(CommitMeta::new(format!("c{i}")), "go", i as i64, &[RawBench::new("X", v)])
                .unwrap();
            assert!(report.alerts.is_empty());
        }

        let report = tracker
            .ingest(
                CommitMeta::new("c3"),
                "go",
                3,
                &[RawBench::new("X", 2700.0), RawBench::new("Y", f64::NAN)],
            )
            .unwrap();
        assert_eq!(report.run_ref, RunRef::new("go", 3));
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.max_severity(), Some(Severity::Warning));
        assert!(report.has_alerts_at(Severity::Warning));
        assert!(!report.has_alerts_at(Severity::Error));

        let metrics = tracker.metrics().unwrap();
        assert_eq!(metrics.runs_appended("go"), 4);
        assert_eq!(metrics.entries_skipped("go"), 1);
        assert_eq!(metrics.alerts_raised("go", "warning"), 1);
    }

    #[test]
    fn test_ingest_run_and_check() {
        let tracker = tracker();
        for v in [100, 100, 300] {
            let raw: RawRun = serde_json::from_value(json!({
                "commit": {"id": "abc"},
                "date": 1,
                "tool": "go",
                "benches": [{"name": "op", "value": v, "unit": "ns/op"}]
            }))
            .unwrap();
            tracker.ingest_run("Go Benchmark", raw).unwrap();
        }

        let alerts = tracker.check("Go Benchmark").unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].tool, "Go Benchmark");
        assert!(tracker.check("go").is_err());
    }

    #[test]
    fn test_open_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.js");

        let tracker = BenchmarkTracker::open(&path, "https://github.com/o/r", DetectorConfig::default()).unwrap();
        assert_eq!(tracker.store().run_count(), 0);
        tracker
            .ingest(CommitMeta::new("abc"), "go", 42, &[RawBench::new("op", 1.0)])
            .unwrap();
        tracker.save(&path).unwrap();

        let reopened = BenchmarkTracker::open(&path, "ignored", DetectorConfig::default()).unwrap();
        assert_eq!(reopened.store().repo_url(), "https://github.com/o/r");
        assert_eq!(reopened.store().last_update(), 42);
        assert!(**reopened.store() == **tracker.store());
        assert_eq!(reopened.query().read("go", Some("op"), None, None).count(), 1);
    }
}
