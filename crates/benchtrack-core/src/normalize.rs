//! Normalization of raw harness output into [`BenchmarkEntry`] values
//!
//! Harness versions disagree about which fields a bench record carries, so the
//! normalizer only relies on the [`RawRecord`] capability: a name and a value.
//! Everything else (unit text, extra annotation, range) is decoded
//! best-effort and degrades to "unknown".

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;
use crate::model::{BenchmarkEntry, SecondaryMetric};

/// Anything that can be normalized into a benchmark entry.
pub trait RawRecord {
    /// Benchmark case name
    fn name(&self) -> Option<&str>;

    /// Primary value, before coercion
    fn value(&self) -> Option<&Value>;

    /// Free-form unit text, possibly encoding secondary metrics
    fn unit(&self) -> Option<&str> {
        None
    }

    /// Free-form annotation, possibly encoding iteration count and parallelism
    fn extra(&self) -> Option<&str> {
        None
    }

    /// Dispersion annotation
    fn range(&self) -> Option<&str> {
        None
    }
}

/// Typed form of one `benches[]` element. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBench {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
}

impl RawBench {
    /// Create a raw bench with a numeric value
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: Some(name.into()),
            value: serde_json::Number::from_f64(value).map(Value::Number),
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_range_opt(mut self, range: Option<String>) -> Self {
        self.range = range;
        self
    }

    pub fn with_raw_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

impl RawRecord for RawBench {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }
}

impl RawRecord for Value {
    fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    fn value(&self) -> Option<&Value> {
        self.get("value")
    }

    fn unit(&self) -> Option<&str> {
        self.get("unit").and_then(Value::as_str)
    }

    fn extra(&self) -> Option<&str> {
        self.get("extra").and_then(Value::as_str)
    }

    fn range(&self) -> Option<&str> {
        self.get("range").and_then(Value::as_str)
    }
}

/// A record that failed normalization and was left out of its run
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    /// Position in the raw payload
    pub index: usize,
    pub name: Option<String>,
    pub error: ParseError,
}

/// Result of normalizing a whole raw payload
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub entries: Vec<BenchmarkEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Decoded form of a unit string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitBreakdown {
    pub primary_unit: Option<String>,
    pub secondary: Vec<SecondaryMetric>,
}

#[derive(Debug, Clone, PartialEq)]
enum UnitToken<'a> {
    Number(f64),
    Word(&'a str),
}

/// Parses raw bench records. Holds its compiled patterns; build once and share.
#[derive(Debug, Clone)]
pub struct Normalizer {
    glued: Regex,
    times: Regex,
    procs: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a normalizer
    pub fn new() -> Self {
        Self {
            glued: Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)([^\d\s.+\-].*)$")
                .expect("glued number/unit pattern is valid"),
            times: Regex::new(r"(?i)(\d+)\s*times\b").expect("times pattern is valid"),
            procs: Regex::new(r"(?i)(\d+)\s*procs?\b").expect("procs pattern is valid"),
        }
    }

    /// Normalize one raw record.
    ///
    /// Fails only when the name is missing or the value is not a finite
    /// number. Unit and extra text never cause a failure.
    pub fn normalize<R: RawRecord + ?Sized>(&self, record: &R) -> Result<BenchmarkEntry, ParseError> {
        let name = record
            .name()
            .filter(|n| !n.trim().is_empty())
            .ok_or(ParseError::MissingName)?;

        let raw_value = record.value().ok_or_else(|| ParseError::MissingValue {
            name: name.to_string(),
        })?;
        let value = coerce_value(raw_value).ok_or_else(|| ParseError::NonNumericValue {
            name: name.to_string(),
            raw: raw_value.to_string(),
        })?;

        let unit = record.unit().unwrap_or_default();
        let extra = record.extra().unwrap_or_default();
        let breakdown = self.parse_unit(unit);
        let (sample_count, parallelism) = self.parse_extra(extra);

        Ok(BenchmarkEntry {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            extra: extra.to_string(),
            range: record.range().map(str::to_string),
            primary_unit: breakdown.primary_unit,
            secondary: breakdown.secondary,
            sample_count,
            parallelism,
        })
    }

    /// Normalize a whole payload. A failing record is skipped and reported;
    /// its siblings still proceed.
    pub fn normalize_all<'a, R, I>(&self, records: I) -> NormalizedBatch
    where
        R: RawRecord + ?Sized + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let mut batch = NormalizedBatch::default();

        for (index, record) in records.into_iter().enumerate() {
            match self.normalize(record) {
                Ok(entry) => batch.entries.push(entry),
                Err(error) => {
                    tracing::warn!(
                        index,
                        entry = record.name().unwrap_or("<unnamed>"),
                        error = %error,
                        "Skipping benchmark entry"
                    );
                    batch.skipped.push(SkippedEntry {
                        index,
                        name: record.name().map(str::to_string),
                        error,
                    });
                }
            }
        }

        batch
    }

    /// Decode a unit string such as `ns/op\t 240 B/op\t 5 allocs/op`.
    ///
    /// A leading word is the primary unit. If the text instead opens with a
    /// `<number> <unit>` pair, that pair describes the primary value. Every
    /// later pair becomes a secondary metric; stray tokens are ignored.
    pub fn parse_unit(&self, unit: &str) -> UnitBreakdown {
        let tokens = self.tokenize(unit);
        let mut breakdown = UnitBreakdown::default();
        let mut i = 0;

        match (tokens.first(), tokens.get(1)) {
            (Some(UnitToken::Word(word)), _) => {
                breakdown.primary_unit = Some((*word).to_string());
                i = 1;
            }
            (Some(UnitToken::Number(_)), Some(UnitToken::Word(word))) => {
                breakdown.primary_unit = Some((*word).to_string());
                i = 2;
            }
            _ => {}
        }

        while i < tokens.len() {
            match (&tokens[i], tokens.get(i + 1)) {
                (UnitToken::Number(value), Some(UnitToken::Word(word))) => {
                    breakdown.secondary.push(SecondaryMetric {
                        label: metric_label(word),
                        value: *value,
                        unit: (*word).to_string(),
                    });
                    i += 2;
                }
                _ => i += 1,
            }
        }

        breakdown
    }

    /// Decode `<N> times` and `<P> procs` from an extra annotation
    pub fn parse_extra(&self, extra: &str) -> (Option<u64>, Option<u32>) {
        let sample_count = self
            .times
            .captures(extra)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        let parallelism = self
            .procs
            .captures(extra)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        (sample_count, parallelism)
    }

    fn tokenize<'a>(&self, unit: &'a str) -> Vec<UnitToken<'a>> {
        let mut tokens = Vec::new();
        for raw in unit.split_whitespace() {
            if let Some(value) = parse_finite(raw) {
                tokens.push(UnitToken::Number(value));
            } else if let Some(caps) = self.glued.captures(raw) {
                match (caps.get(1).and_then(|m| parse_finite(m.as_str())), caps.get(2)) {
                    (Some(value), Some(word)) => {
                        tokens.push(UnitToken::Number(value));
                        tokens.push(UnitToken::Word(word.as_str()));
                    }
                    _ => tokens.push(UnitToken::Word(raw)),
                }
            } else {
                tokens.push(UnitToken::Word(raw));
            }
        }
        tokens
    }
}

/// Coerce a raw JSON value into a finite number
pub fn coerce_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_finite(s.trim()),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn parse_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn metric_label(unit: &str) -> String {
    match unit.split('/').next() {
        Some(numerator) if !numerator.is_empty() => numerator.to_string(),
        _ => unit.to_string(),
    }
}
