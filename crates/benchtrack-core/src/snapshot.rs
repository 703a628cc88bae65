//! Persisted snapshot document: wire types and file I/O
//!
//! The document is `{lastUpdate, repoUrl, entries}` where `entries` maps a tool
//! key to its runs in append order. It is stored either as plain JSON or as
//! the `window.BENCHMARK_DATA = {...}` script the chart front end loads.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::{Result, TrackerError};
use crate::model::{BenchmarkEntry, CommitMeta};
use crate::normalize::RawBench;

/// Assignment prefix of the script form
pub const SCRIPT_PREFIX: &str = "window.BENCHMARK_DATA = ";

/// The whole persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Date of the most recently appended run, epoch milliseconds
    pub last_update: i64,
    pub repo_url: String,
    pub entries: IndexMap<String, Vec<SnapshotRun>>,
}

/// One persisted run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRun {
    pub commit: CommitMeta,
    pub date: i64,
    pub tool: String,
    pub benches: Vec<SnapshotBench>,
}

/// One persisted bench record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBench {
    pub name: String,
    #[serde(serialize_with = "serialize_measurement")]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub extra: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl Snapshot {
    /// Create an empty snapshot for a repository
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            last_update: 0,
            repo_url: repo_url.into(),
            entries: IndexMap::new(),
        }
    }

    /// Total number of runs across all tools
    pub fn run_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl From<&BenchmarkEntry> for SnapshotBench {
    fn from(entry: &BenchmarkEntry) -> Self {
        Self {
            name: entry.name.clone(),
            value: entry.value,
            unit: entry.unit.clone(),
            extra: entry.extra.clone(),
            range: entry.range.clone(),
        }
    }
}

impl From<&SnapshotBench> for RawBench {
    fn from(bench: &SnapshotBench) -> Self {
        RawBench::new(bench.name.clone(), bench.value)
            .with_unit(bench.unit.clone())
            .with_extra(bench.extra.clone())
            .with_range_opt(bench.range.clone())
    }
}

/// Integral measurements are written without a fractional part, the way
/// harnesses report them.
fn serialize_measurement<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// On-disk representation of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Plain JSON
    Json,
    /// `window.BENCHMARK_DATA = {...}`
    Script,
}

impl DocumentFormat {
    /// `.js` files use the script form, everything else plain JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("js") => DocumentFormat::Script,
            _ => DocumentFormat::Json,
        }
    }
}

/// Parse a document in either form.
///
/// Any mismatch with the schema is a [`TrackerError::SnapshotCorruption`]:
/// history is never silently dropped.
pub fn parse_document(text: &str) -> Result<Snapshot> {
    let body = strip_script_prefix(text.trim());
    serde_json::from_str(body).map_err(|e| {
        TrackerError::corruption(format!(
            "document does not match the snapshot schema at line {}, column {}: {}",
            e.line(),
            e.column(),
            e
        ))
    })
}

/// Render a document in the given form
pub fn render_document(snapshot: &Snapshot, format: DocumentFormat) -> Result<String> {
    let json = serde_json::to_string_pretty(snapshot)?;
    Ok(match format {
        DocumentFormat::Json => json,
        DocumentFormat::Script => format!("{}{}", SCRIPT_PREFIX, json),
    })
}

fn strip_script_prefix(text: &str) -> &str {
    if !text.starts_with("window.") {
        return text;
    }
    let body = match text.find('=') {
        Some(pos) => &text[pos + 1..],
        None => text,
    };
    body.trim().trim_end_matches(';').trim_end()
}

/// Read a snapshot file
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let content = fs::read_to_string(path).map_err(|e| {
        TrackerError::file_error(format!(
            "Failed to read snapshot '{}': {}",
            path.display(),
            e
        ))
    })?;
    let snapshot = parse_document(&content)?;
    tracing::debug!(
        path = %path.display(),
        tools = snapshot.entries.len(),
        runs = snapshot.run_count(),
        "Loaded snapshot"
    );
    Ok(snapshot)
}

/// Read a snapshot file, or `None` when it does not exist yet
pub fn read_snapshot_if_exists(path: &Path) -> Result<Option<Snapshot>> {
    match fs::metadata(path) {
        Ok(_) => read_snapshot(path).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a snapshot file, choosing the form from the extension.
///
/// The document is written to a sibling temporary file and renamed into
/// place, so readers never observe a half-written snapshot.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let rendered = render_document(snapshot, DocumentFormat::from_path(path))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(rendered.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|e| {
        TrackerError::file_error(format!(
            "Failed to write snapshot '{}': {}",
            path.display(),
            e.error
        ))
    })?;

    tracing::debug!(
        path = %path.display(),
        runs = snapshot.run_count(),
        "Wrote snapshot"
    );
    Ok(())
}
