//! Regression detector configuration
//!
//! Sources, lowest precedence first: built-in defaults, a config file
//! (TOML, YAML or JSON by extension), then `BENCHTRACK_*` environment
//! variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Result, TrackerError};

/// Default number of prior samples averaged into the baseline
pub const DEFAULT_WINDOW: usize = 5;

/// Default number of prior samples required before a series can alert
pub const DEFAULT_MIN_HISTORY: usize = 2;

/// Default tolerated worsening, as a fraction of the baseline
pub const DEFAULT_THRESHOLD_RATIO: f64 = 1.0;

/// Which way a series gets worse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Time per operation, bytes per operation, ...
    #[default]
    LowerIsBetter,
    /// Throughput, operations per second, ...
    HigherIsBetter,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LowerIsBetter => write!(f, "lower_is_better"),
            Direction::HigherIsBetter => write!(f, "higher_is_better"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "lower_is_better" | "lower" => Ok(Direction::LowerIsBetter),
            "higher_is_better" | "higher" => Ok(Direction::HigherIsBetter),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// Per-benchmark override of the global policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesOverride {
    /// Benchmark case name
    pub name: String,
    /// Restrict the override to one tool key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

/// Effective policy for one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPolicy {
    pub threshold_ratio: f64,
    pub direction: Direction,
}

/// Regression detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Prior samples averaged into the baseline
    pub window: usize,
    /// Prior samples required before a series can alert
    pub min_history: usize,
    /// Global tolerated worsening as a fraction of the baseline
    pub threshold_ratio: f64,
    pub overrides: Vec<SeriesOverride>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            min_history: DEFAULT_MIN_HISTORY,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            overrides: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Create a new config builder
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::new()
    }

    /// Defaults overlaid with `BENCHTRACK_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load a config file; the format follows the extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrackerError::file_error(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let config: DetectorConfig = match extension.as_str() {
            "toml" => toml::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| TrackerError::config_error(format!("JSON error: {}", e)))?,
            _ => {
                return Err(TrackerError::config_error(format!(
                    "Unsupported config format: {}. Supported formats: toml, yaml, yml, json",
                    extension
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment-like lookup. Unparseable values are
    /// ignored with a warning.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(window) = parse_env(&lookup, "BENCHTRACK_WINDOW") {
            self.window = window;
        }
        if let Some(min_history) = parse_env(&lookup, "BENCHTRACK_MIN_HISTORY") {
            self.min_history = min_history;
        }
        if let Some(threshold) = parse_env(&lookup, "BENCHTRACK_THRESHOLD") {
            self.threshold_ratio = threshold;
        }
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(TrackerError::config_error("window must be at least 1"));
        }
        if self.min_history == 0 {
            return Err(TrackerError::config_error("min_history must be at least 1"));
        }
        check_ratio("threshold_ratio", self.threshold_ratio)?;
        for rule in &self.overrides {
            if rule.name.is_empty() {
                return Err(TrackerError::config_error("override name must not be empty"));
            }
            if let Some(ratio) = rule.threshold_ratio {
                check_ratio(&format!("threshold_ratio for '{}'", rule.name), ratio)?;
            }
        }
        Ok(())
    }

    /// Effective policy for a series. A tool-scoped override beats a
    /// name-only one; fields an override leaves unset fall through.
    pub fn policy_for(&self, tool: &str, name: &str) -> SeriesPolicy {
        let scoped = self
            .overrides
            .iter()
            .find(|o| o.name == name && o.tool.as_deref() == Some(tool));
        let general = self
            .overrides
            .iter()
            .find(|o| o.name == name && o.tool.is_none());

        let threshold_ratio = scoped
            .and_then(|o| o.threshold_ratio)
            .or_else(|| general.and_then(|o| o.threshold_ratio))
            .unwrap_or(self.threshold_ratio);
        let direction = scoped
            .and_then(|o| o.direction)
            .or_else(|| general.and_then(|o| o.direction))
            .unwrap_or_default();

        SeriesPolicy {
            threshold_ratio,
            direction,
        }
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

fn check_ratio(what: &str, ratio: f64) -> Result<()> {
    if ratio.is_finite() && ratio >= 0.0 {
        Ok(())
    } else {
        Err(TrackerError::config_error(format!(
            "{} must be a finite, non-negative fraction (got {})",
            what, ratio
        )))
    }
}

/// Builder for DetectorConfig
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl Default for DetectorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
        }
    }

    pub fn window(mut self, window: usize) -> Self {
        self.config.window = window;
        self
    }

    pub fn min_history(mut self, min_history: usize) -> Self {
        self.config.min_history = min_history;
        self
    }

    pub fn threshold_ratio(mut self, ratio: f64) -> Self {
        self.config.threshold_ratio = ratio;
        self
    }

    /// Override the threshold for one benchmark name
    pub fn threshold_for(mut self, name: impl Into<String>, ratio: f64) -> Self {
        self.config.overrides.push(SeriesOverride {
            name: name.into(),
            tool: None,
            threshold_ratio: Some(ratio),
            direction: None,
        });
        self
    }

    /// Set the direction for one benchmark name
    pub fn direction_for(mut self, name: impl Into<String>, direction: Direction) -> Self {
        self.config.overrides.push(SeriesOverride {
            name: name.into(),
            tool: None,
            threshold_ratio: None,
            direction: Some(direction),
        });
        self
    }

    pub fn override_series(mut self, rule: SeriesOverride) -> Self {
        self.config.overrides.push(rule);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<DetectorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.window, 5);
        assert_eq!(config.min_history, 2);
        assert_eq!(config.threshold_ratio, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_precedence() {
        let config = DetectorConfig::builder()
            .threshold_ratio(0.2)
            .threshold_for("op_a", 0.5)
            .direction_for("throughput", Direction::HigherIsBetter)
            .override_series(SeriesOverride {
                name: "op_a".to_string(),
                tool: Some("go".to_string()),
                threshold_ratio: Some(0.1),
                direction: None,
            })
            .build()
            .unwrap();

        assert_eq!(config.policy_for("go", "op_a").threshold_ratio, 0.1);
        assert_eq!(config.policy_for("rust", "op_a").threshold_ratio, 0.5);
        assert_eq!(config.policy_for("go", "op_b").threshold_ratio, 0.2);
        assert_eq!(
            config.policy_for("go", "throughput").direction,
            Direction::HigherIsBetter
        );
        assert_eq!(config.policy_for("go", "op_a").direction, Direction::LowerIsBetter);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(DetectorConfig::builder().window(0).build().is_err());
        assert!(DetectorConfig::builder().min_history(0).build().is_err());
        assert!(DetectorConfig::builder().threshold_ratio(-0.1).build().is_err());
        assert!(DetectorConfig::builder().threshold_ratio(f64::NAN).build().is_err());
        assert!(DetectorConfig::builder().threshold_for("x", f64::INFINITY).build().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BENCHTRACK_WINDOW", "3"),
            ("BENCHTRACK_THRESHOLD", "0.25"),
            ("BENCHTRACK_MIN_HISTORY", "many"),
        ]
        .into_iter()
        .collect();

        let config = DetectorConfig::default()
            .with_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.window, 3);
        assert_eq!(config.threshold_ratio, 0.25);
        assert_eq!(config.min_history, DEFAULT_MIN_HISTORY);
    }

    #[test]
    fn test_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("detector.toml");
        std::fs::write(
            &path,
            r#"
window = 3
threshold_ratio = 0.2

[[overrides]]
name = "BenchmarkThroughput"
direction = "higher_is_better"
threshold_ratio = 0.1
"#,
        )
        .unwrap();

        let config = DetectorConfig::from_file(&path).unwrap();
        assert_eq!(config.window, 3);
        assert_eq!(config.min_history, DEFAULT_MIN_HISTORY);
        let policy = config.policy_for("go", "BenchmarkThroughput");
        assert_eq!(policy.direction, Direction::HigherIsBetter);
        assert_eq!(policy.threshold_ratio, 0.1);
    }

    #[test]
    fn test_from_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("detector.yaml");
        std::fs::write(&path, "window: 4\nmin_history: 3\n").unwrap();

        let config = DetectorConfig::from_file(&path).unwrap();
        assert_eq!(config.window, 4);
        assert_eq!(config.min_history, 3);
    }

    #[test]
    fn test_unsupported_and_invalid_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("detector.ini");
        std::fs::write(&path, "window=3").unwrap();
        assert!(matches!(
            DetectorConfig::from_file(&path),
            Err(TrackerError::ConfigError(_))
        ));

        let path = temp_dir.path().join("detector.json");
        std::fs::write(&path, r#"{"window": 0}"#).unwrap();
        assert!(DetectorConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("higher".parse::<Direction>().unwrap(), Direction::HigherIsBetter);
        assert_eq!(
            "Lower-Is-Better".parse::<Direction>().unwrap(),
            Direction::LowerIsBetter
        );
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::HigherIsBetter.to_string(), "higher_is_better");
    }
}
