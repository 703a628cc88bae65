//! Prometheus metrics for ingestion
//!
//! - `benchtrack_runs_appended_total` (counter) - runs appended, by tool
//! - `benchtrack_entries_skipped_total` (counter) - raw entries that failed normalization, by tool
//! - `benchtrack_alerts_total` (counter) - regression alerts, by tool and severity
//! - `benchtrack_append_duration_seconds` (histogram) - append plus evaluation time, by tool

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;

use crate::detector::Alert;
use crate::error::{Result, TrackerError};

/// Ingestion metrics registered in a shared registry
#[derive(Clone)]
pub struct IngestMetrics {
    registry: Arc<Registry>,
    runs_appended: CounterVec,
    entries_skipped: CounterVec,
    alerts: CounterVec,
    append_duration: HistogramVec,
}

impl IngestMetrics {
    /// Create metrics in a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create and register metrics with an existing registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let runs_appended = CounterVec::new(
            Opts::new("runs_appended_total", "Total number of benchmark runs appended")
                .namespace("benchtrack"),
            &["tool"],
        )?;

        let entries_skipped = CounterVec::new(
            Opts::new(
                "entries_skipped_total",
                "Total number of raw benchmark entries skipped during normalization",
            )
            .namespace("benchtrack"),
            &["tool"],
        )?;

        let alerts = CounterVec::new(
            Opts::new("alerts_total", "Total number of regression alerts raised")
                .namespace("benchtrack"),
            &["tool", "severity"],
        )?;

        let append_duration = HistogramVec::new(
            HistogramOpts::new(
                "append_duration_seconds",
                "Time to append and evaluate one run in seconds",
            )
            .namespace("benchtrack")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["tool"],
        )?;

        registry.register(Box::new(runs_appended.clone()))?;
        registry.register(Box::new(entries_skipped.clone()))?;
        registry.register(Box::new(alerts.clone()))?;
        registry.register(Box::new(append_duration.clone()))?;

        Ok(Self {
            registry,
            runs_appended,
            entries_skipped,
            alerts,
            append_duration,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Record one appended run and how many of its entries were skipped
    pub fn record_append(&self, tool: &str, skipped: usize) {
        self.runs_appended.with_label_values(&[tool]).inc();
        if skipped > 0 {
            self.entries_skipped
                .with_label_values(&[tool])
                .inc_by(skipped as f64);
        }
    }

    pub fn record_alerts(&self, alerts: &[Alert]) {
        for alert in alerts {
            let severity = alert.severity.to_string();
            self.alerts
                .with_label_values(&[alert.tool.as_str(), severity.as_str()])
                .inc();
        }
    }

    pub fn observe_duration(&self, tool: &str, seconds: f64) {
        self.append_duration
            .with_label_values(&[tool])
            .observe(seconds);
    }

    /// Start a timer that records into `append_duration_seconds` on drop
    pub fn start_timer(&self, tool: &str) -> AppendTimer<'_> {
        AppendTimer {
            start: Instant::now(),
            tool: tool.to_string(),
            metrics: self,
        }
    }

    pub fn runs_appended(&self, tool: &str) -> u64 {
        self.runs_appended.with_label_values(&[tool]).get() as u64
    }

    pub fn entries_skipped(&self, tool: &str) -> u64 {
        self.entries_skipped.with_label_values(&[tool]).get() as u64
    }

    pub fn alerts_raised(&self, tool: &str, severity: &str) -> u64 {
        self.alerts.with_label_values(&[tool, severity]).get() as u64
    }

    /// Encode all registered metrics in the text exposition format
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| TrackerError::SerializationError(format!("metrics text: {}", e)))
    }
}

impl std::fmt::Debug for IngestMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestMetrics").finish_non_exhaustive()
    }
}

/// RAII guard for timing an append
pub struct AppendTimer<'a> {
    start: Instant,
    tool: String,
    metrics: &'a IngestMetrics,
}

impl AppendTimer<'_> {
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for AppendTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .observe_duration(&self.tool, self.start.elapsed().as_secs_f64());
    }
}
