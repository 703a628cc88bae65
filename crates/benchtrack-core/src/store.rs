//! Append-only run store
//!
//! Runs are grouped by tool key and kept in the order `append` was called.
//! Each tool log sits behind its own writer lock, so appends to different
//! tools never wait on each other, while appends to one tool are serialized.
//!
//! A tool log is an `Arc<Vec<Arc<Run>>>`. Readers clone the outer `Arc` and
//! walk that frozen view; a writer pushes through `Arc::make_mut`, which only
//! copies the run pointers when a reader still holds the previous view.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, TrackerError};
use crate::model::{BenchmarkEntry, CommitMeta, Run, RunRef};
use crate::normalize::{Normalizer, RawBench, RawRecord, SkippedEntry};
use crate::snapshot::{Snapshot, SnapshotBench, SnapshotRun};

/// Pre-parsed form of one `entries[tool][i]` object as delivered by an
/// ingestion caller. Benches stay untyped until normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRun {
    #[serde(default, deserialize_with = "crate::model::null_default")]
    pub commit: CommitMeta,
    /// Execution time, epoch milliseconds
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub benches: Vec<Value>,
}

/// What a successful append produced
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub run_ref: RunRef,
    pub run: Arc<Run>,
    /// Raw entries left out because they failed normalization
    pub skipped: Vec<SkippedEntry>,
}

/// One sample of a series: a run and the position of its representative entry
#[derive(Debug, Clone)]
pub struct SeriesPoint {
    /// Position of the run in its tool log
    pub run_index: usize,
    pub run: Arc<Run>,
    pub entry_index: usize,
}

impl SeriesPoint {
    pub fn entry(&self) -> &BenchmarkEntry {
        &self.run.benches[self.entry_index]
    }

    pub fn value(&self) -> f64 {
        self.entry().value
    }

    /// Run execution time, epoch milliseconds
    pub fn timestamp(&self) -> i64 {
        self.run.date
    }

    pub fn commit(&self) -> &CommitMeta {
        &self.run.commit
    }
}

/// All samples of one (tool, benchmark) pair in append order
#[derive(Debug, Clone)]
pub struct Series {
    pub tool: String,
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(SeriesPoint::value).collect()
    }
}

/// Frozen view of one tool's runs. Later appends are not visible through it.
#[derive(Debug, Clone)]
pub struct RunLog {
    tool: String,
    runs: Arc<Vec<Arc<Run>>>,
}

impl RunLog {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Run>> {
        self.runs.get(index)
    }

    pub fn last(&self) -> Option<&Arc<Run>> {
        self.runs.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Run>> {
        self.runs.iter()
    }

    /// Samples of `name` from runs before `end` (exclusive), one per run
    pub fn points_before(&self, name: &str, end: usize) -> impl Iterator<Item = SeriesPoint> + '_ {
        let name = name.to_string();
        self.runs[..end.min(self.runs.len())]
            .iter()
            .enumerate()
            .filter_map(move |(run_index, run)| {
                run.entry_index(&name).map(|entry_index| SeriesPoint {
                    run_index,
                    run: Arc::clone(run),
                    entry_index,
                })
            })
    }

    /// The full series for `name`
    pub fn series(&self, name: &str) -> Series {
        Series {
            tool: self.tool.clone(),
            name: name.to_string(),
            points: self.points_before(name, self.runs.len()).collect(),
        }
    }

    /// Distinct benchmark names in first-seen order
    pub fn benchmark_names(&self) -> Vec<String> {
        let mut names: IndexSet<&str> = IndexSet::new();
        for run in self.runs.iter() {
            for bench in &run.benches {
                names.insert(bench.name.as_str());
            }
        }
        names.into_iter().map(str::to_string).collect()
    }

    pub(crate) fn shared(&self) -> Arc<Vec<Arc<Run>>> {
        Arc::clone(&self.runs)
    }
}

#[derive(Debug, Default)]
struct ToolLog {
    runs: Mutex<Arc<Vec<Arc<Run>>>>,
}

impl ToolLog {
    fn with_runs(runs: Vec<Arc<Run>>) -> Self {
        Self {
            runs: Mutex::new(Arc::new(runs)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<Arc<Run>>>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self) -> Arc<Vec<Arc<Run>>> {
        Arc::clone(&self.lock())
    }
}

/// The append-only multi-series store.
///
/// Constructed empty or from a loaded [`Snapshot`], mutated only through
/// [`Store::append`] / [`Store::append_run`], flushed with [`Store::dump`].
#[derive(Debug)]
pub struct Store {
    repo_url: String,
    normalizer: Normalizer,
    tools: RwLock<IndexMap<String, Arc<ToolLog>>>,
    last_update: AtomicI64,
}

impl Store {
    /// Create an empty store for a repository
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            normalizer: Normalizer::new(),
            tools: RwLock::new(IndexMap::new()),
            last_update: AtomicI64::new(0),
        }
    }

    /// Rebuild a store from a persisted snapshot.
    ///
    /// Every persisted bench must normalize; one that does not means the
    /// document is corrupted and the whole load is refused.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let normalizer = Normalizer::new();
        let mut tools = IndexMap::with_capacity(snapshot.entries.len());

        for (key, runs) in snapshot.entries {
            let mut log = Vec::with_capacity(runs.len());
            for (position, run) in runs.into_iter().enumerate() {
                let mut benches = Vec::with_capacity(run.benches.len());
                for bench in &run.benches {
                    let entry = normalizer.normalize(&RawBench::from(bench)).map_err(|e| {
                        TrackerError::corruption(format!(
                            "entries[{:?}][{}]: {}",
                            key, position, e
                        ))
                    })?;
                    benches.push(entry);
                }
                log.push(Arc::new(Run {
                    commit: run.commit,
                    date: run.date,
                    tool: run.tool,
                    benches,
                }));
            }
            tools.insert(key, Arc::new(ToolLog::with_runs(log)));
        }

        Ok(Self {
            repo_url: snapshot.repo_url,
            normalizer,
            tools: RwLock::new(tools),
            last_update: AtomicI64::new(snapshot.last_update),
        })
    }

    /// Produce the persisted document for the current state
    pub fn dump(&self) -> Snapshot {
        let entries = self
            .read_tools()
            .iter()
            .map(|(key, log)| {
                let runs = log
                    .view()
                    .iter()
                    .map(|run| SnapshotRun {
                        commit: run.commit.clone(),
                        date: run.date,
                        tool: run.tool.clone(),
                        benches: run.benches.iter().map(SnapshotBench::from).collect(),
                    })
                    .collect();
                (key.clone(), runs)
            })
            .collect();

        Snapshot {
            last_update: self.last_update(),
            repo_url: self.repo_url.clone(),
            entries,
        }
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    /// Date of the most recently appended run, epoch milliseconds
    pub fn last_update(&self) -> i64 {
        self.last_update.load(Ordering::SeqCst)
    }

    /// Append one run under `tool`, which is both the partition key and the
    /// run's recorded tool.
    pub fn append<R: RawRecord>(
        &self,
        commit: CommitMeta,
        tool: &str,
        date: i64,
        raw_entries: &[R],
    ) -> Result<AppendOutcome> {
        self.append_normalized(tool, tool.to_string(), commit, date, raw_entries)
    }

    /// Append a pre-parsed run under `key`. The run keeps its own `tool`
    /// field when present; a missing date means "now".
    pub fn append_run(&self, key: &str, raw: RawRun) -> Result<AppendOutcome> {
        let RawRun {
            commit,
            date,
            tool,
            benches,
        } = raw;
        let tool = tool
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| key.to_string());
        let date = date.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        self.append_normalized(key, tool, commit, date, &benches)
    }

    fn append_normalized<R: RawRecord>(
        &self,
        key: &str,
        tool: String,
        commit: CommitMeta,
        date: i64,
        raw_entries: &[R],
    ) -> Result<AppendOutcome> {
        if key.trim().is_empty() {
            return Err(TrackerError::invalid_input("tool key must not be empty"));
        }

        let missing = commit.missing_fields();
        if !missing.is_empty() {
            tracing::debug!(tool = key, commit = %commit.id, ?missing, "Commit metadata defaulted");
        }

        let batch = self.normalizer.normalize_all(raw_entries);
        if batch.entries.is_empty() && !raw_entries.is_empty() {
            tracing::warn!(
                tool = key,
                commit = %commit.id,
                skipped = batch.skipped.len(),
                "No benchmark entry could be parsed; appending an empty run"
            );
        }

        let run = Arc::new(Run {
            commit,
            date,
            tool,
            benches: batch.entries,
        });

        let log = self.tool_log(key);
        let index = {
            let mut runs = log.lock();
            Arc::make_mut(&mut runs).push(Arc::clone(&run));
            self.last_update.store(date, Ordering::SeqCst);
            runs.len() - 1
        };

        tracing::info!(
            tool = key,
            index,
            commit = %run.commit.id,
            entries = run.benches.len(),
            skipped = batch.skipped.len(),
            "Appended run"
        );

        Ok(AppendOutcome {
            run_ref: RunRef::new(key, index),
            run,
            skipped: batch.skipped,
        })
    }

    /// Tool keys in first-appended order
    pub fn tools(&self) -> Vec<String> {
        self.read_tools().keys().cloned().collect()
    }

    /// Frozen view of a tool's runs
    pub fn runs(&self, tool: &str) -> Option<RunLog> {
        let log = self.read_tools().get(tool).cloned()?;
        Some(RunLog {
            tool: tool.to_string(),
            runs: log.view(),
        })
    }

    /// Resolve a run reference
    pub fn run(&self, run_ref: &RunRef) -> Result<Arc<Run>> {
        let log = self
            .runs(&run_ref.tool)
            .ok_or_else(|| TrackerError::UnknownTool(run_ref.tool.clone()))?;
        log.get(run_ref.index)
            .cloned()
            .ok_or_else(|| TrackerError::RunNotFound {
                tool: run_ref.tool.clone(),
                index: run_ref.index,
            })
    }

    /// Total number of runs across all tools
    pub fn run_count(&self) -> usize {
        self.read_tools().values().map(|log| log.lock().len()).sum()
    }

    /// The series for (tool, name), one sample per run, first occurrence wins.
    /// An unknown tool yields an empty series.
    pub fn series_for(&self, tool: &str, name: &str) -> Series {
        match self.runs(tool) {
            Some(log) => log.series(name),
            None => Series {
                tool: tool.to_string(),
                name: name.to_string(),
                points: Vec::new(),
            },
        }
    }

    fn tool_log(&self, key: &str) -> Arc<ToolLog> {
        {
            let tools = self.read_tools();
            if let Some(log) = tools.get(key) {
                return Arc::clone(log);
            }
        }
        let mut tools = self.write_tools();
        Arc::clone(
            tools
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(ToolLog::default())),
        )
    }

    fn read_tools(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<ToolLog>>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tools(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<ToolLog>>> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        if self.repo_url != other.repo_url || self.last_update() != other.last_update() {
            return false;
        }
        let tools = self.tools();
        if tools != other.tools() {
            return false;
        }
        tools.iter().all(|tool| match (self.runs(tool), other.runs(tool)) {
            (Some(a), Some(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            _ => false,
        })
    }
}
