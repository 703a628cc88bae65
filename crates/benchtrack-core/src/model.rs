//! Canonical data model for tracked benchmark runs
//!
//! These are the in-memory shapes the store, detector and query service share.
//! The persisted document uses its own wire types (see [`crate::snapshot`]) so
//! that parsed sub-metrics never leak into the file format.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Deserialize a field that may be absent or `null` into its default.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A commit author or committer as reported by the VCS host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub username: String,
    #[serde(deserialize_with = "null_default")]
    pub email: String,
}

impl Person {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            email: email.into(),
        }
    }
}

/// Commit metadata attached to every run. Immutable once created.
///
/// Field order matches the persisted document. Absent or `null` fields
/// deserialize to empty strings; see [`CommitMeta::missing_fields`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitMeta {
    #[serde(deserialize_with = "null_default")]
    pub author: Person,
    #[serde(deserialize_with = "null_default")]
    pub committer: Person,
    /// VCS hash
    #[serde(deserialize_with = "null_default")]
    pub id: String,
    #[serde(deserialize_with = "null_default")]
    pub message: String,
    /// ISO-8601 commit timestamp, kept verbatim
    #[serde(deserialize_with = "null_default")]
    pub timestamp: String,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
}

impl CommitMeta {
    /// Create commit metadata with only an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: Person) -> Self {
        self.author = author;
        self
    }

    pub fn with_committer(mut self, committer: Person) -> Self {
        self.committer = committer;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Parse the commit timestamp, if it is valid RFC 3339
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }

    /// Names of metadata fields that were absent and defaulted to empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("id", self.id.is_empty()),
            ("message", self.message.is_empty()),
            ("timestamp", self.timestamp.is_empty()),
            ("url", self.url.is_empty()),
            ("author.name", self.author.name.is_empty()),
            ("author.username", self.author.username.is_empty()),
            ("author.email", self.author.email.is_empty()),
            ("committer.name", self.committer.name.is_empty()),
            ("committer.username", self.committer.username.is_empty()),
            ("committer.email", self.committer.email.is_empty()),
        ];
        checks
            .into_iter()
            .filter_map(|(field, missing)| missing.then_some(field))
            .collect()
    }

    /// Abbreviated commit id for display
    pub fn short_id(&self) -> &str {
        self.id.get(..7).unwrap_or(&self.id)
    }

    /// First line of the commit message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A secondary metric decoded from a unit string, e.g. `240 B/op`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryMetric {
    /// Numerator of the unit (`B` for `B/op`, `allocs` for `allocs/op`)
    pub label: String,
    pub value: f64,
    pub unit: String,
}

impl fmt::Display for SecondaryMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// One named measurement within a run.
///
/// `value` is always present and finite. Everything decoded from `unit` and
/// `extra` is best-effort: unknown stays `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub name: String,
    pub value: f64,
    /// Raw unit text as reported by the harness
    pub unit: String,
    /// Raw extra annotation as reported by the harness
    pub extra: String,
    /// Dispersion annotation some harnesses emit (`± 12`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    /// Unit label of the primary value (`ns/op`)
    pub primary_unit: Option<String>,
    pub secondary: Vec<SecondaryMetric>,
    /// Iterations the harness ran (`517521 times`)
    pub sample_count: Option<u64>,
    /// Parallelism the harness ran with (`2 procs`)
    pub parallelism: Option<u32>,
}

impl BenchmarkEntry {
    /// Look up a secondary metric by label
    pub fn secondary_metric(&self, label: &str) -> Option<&SecondaryMetric> {
        self.secondary.iter().find(|m| m.label == label)
    }

    /// Display unit for the primary value, falling back to the raw text
    pub fn display_unit(&self) -> &str {
        self.primary_unit.as_deref().unwrap_or(self.unit.trim())
    }
}

impl fmt::Display for BenchmarkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.value, self.display_unit())
    }
}

/// One execution of a tool's full benchmark suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub commit: CommitMeta,
    /// Execution time in epoch milliseconds, independent of the commit time
    pub date: i64,
    pub tool: String,
    /// Entries in harness order
    pub benches: Vec<BenchmarkEntry>,
}

impl Run {
    /// First entry with the given name
    pub fn entry(&self, name: &str) -> Option<&BenchmarkEntry> {
        self.benches.iter().find(|b| b.name == name)
    }

    /// Position of the first entry with the given name
    pub fn entry_index(&self, name: &str) -> Option<usize> {
        self.benches.iter().position(|b| b.name == name)
    }

    /// Entries that represent their series in this run: the first occurrence
    /// of every name, in harness order.
    pub fn representative_entries(&self) -> impl Iterator<Item = (usize, &BenchmarkEntry)> {
        let mut seen = HashSet::new();
        self.benches
            .iter()
            .enumerate()
            .filter(move |(_, b)| seen.insert(b.name.as_str()))
    }

    /// Execution time as a UTC timestamp
    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.date).single()
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.executed_at() {
            Some(at) => write!(
                f,
                "[{}] {} @ {} ({} benches)",
                at.format("%Y-%m-%d %H:%M:%S UTC"),
                self.tool,
                self.commit.short_id(),
                self.benches.len()
            ),
            None => write!(
                f,
                "[{}] {} @ {} ({} benches)",
                self.date,
                self.tool,
                self.commit.short_id(),
                self.benches.len()
            ),
        }
    }
}

/// Stable reference to a run: its tool key and position in that tool's log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunRef {
    pub tool: String,
    pub index: usize,
}

impl RunRef {
    pub fn new(tool: impl Into<String>, index: usize) -> Self {
        Self {
            tool: tool.into(),
            index,
        }
    }
}

impl fmt::Display for RunRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tool, self.index)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn entry(name: &str, value: f64) -> BenchmarkEntry {
        BenchmarkEntry {
            name: name.to_string(),
            value,
            unit: "ns/op".to_string(),
            extra: String::new(),
            range: None,
            primary_unit: Some("ns/op".to_string()),
            secondary: Vec::new(),
            sample_count: None,
            parallelism: None,
        }
    }
}
