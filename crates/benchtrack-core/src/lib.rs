//! Benchmark Tracking Engine
//!
//! Ingests per-commit benchmark results, keeps them as append-only series per
//! (tool, benchmark) and flags regressions against a rolling baseline.
//!
//! ## Architecture
//!
//! 1. **Normalizer** (`normalize`): raw harness records into canonical
//!    [`BenchmarkEntry`] values, decoding secondary metrics from unit text.
//!
//! 2. **Store** (`store`): append-only run logs grouped by tool key, with
//!    per-tool writers and copy-on-write readers.
//!
//! 3. **RegressionDetector** (`detector`): compares a run with the mean of the
//!    preceding samples of each series.
//!
//! 4. **QueryService** (`query`): lazy, restartable reads over a captured view.
//!
//! 5. **Snapshot** (`snapshot`): the persisted `{lastUpdate, repoUrl, entries}`
//!    document, as plain JSON or as the `window.BENCHMARK_DATA = ...` script.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use benchtrack_core::{BenchmarkTracker, CommitMeta, DetectorConfig, RawBench, Store};
//!
//! let tracker = BenchmarkTracker::new(Arc::new(Store::new("https://github.com/o/r")), DetectorConfig::default());
//! let report = tracker
//!     .ingest(
//!         CommitMeta::new("5201f6b7"),
//!         "go",
//!         1_661_223_171_368,
//!         &[RawBench::new("BenchmarkResolve", 2217.0).with_unit("ns/op\t 240 B/op\t 5 allocs/op")],
//!     )
//!     .unwrap();
//! for alert in &report.alerts {
//!     println!("{}", alert);
//! }
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod model;
pub mod normalize;
pub mod query;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod tracker;

pub use config::{DetectorConfig, DetectorConfigBuilder, Direction, SeriesOverride, SeriesPolicy};
pub use detector::{Alert, BaselineStat, RegressionDetector, Severity};
pub use error::{ParseError, Result, TrackerError};
pub use model::{BenchmarkEntry, CommitMeta, Person, Run, RunRef, SecondaryMetric};
pub use normalize::{RawBench, RawRecord, Normalizer, NormalizedBatch, SkippedEntry};
pub use query::{QueryService, SeriesQuery};
pub use snapshot::{read_snapshot, write_snapshot, DocumentFormat, Snapshot};
pub use store::{AppendOutcome, RawRun, RunLog, Series, SeriesPoint, Store};
pub use telemetry::IngestMetrics;
pub use tracker::{BenchmarkTracker, IngestReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
