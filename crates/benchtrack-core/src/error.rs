//! Error types for the benchmark tracking engine
//!
//! Entry- and field-level problems are absorbed where they occur; only the
//! variants in [`TrackerError`] ever reach a caller.

use thiserror::Error;

/// Main error type for store, snapshot and configuration operations
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// The persisted snapshot does not match the document schema
    #[error("Snapshot corrupted: {0}")]
    SnapshotCorruption(String),

    /// Serialization error while writing a snapshot or report
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Detector configuration is unreadable or out of range
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No runs have been recorded under the requested tool key
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A run reference points past the end of its tool log
    #[error("Run {index} not found for tool '{tool}'")]
    RunNotFound { tool: String, index: usize },

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

impl TrackerError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        TrackerError::InvalidInput(msg.into())
    }

    /// Create a file error
    pub fn file_error(msg: impl Into<String>) -> Self {
        TrackerError::FileError(msg.into())
    }

    /// Create a snapshot corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        TrackerError::SnapshotCorruption(msg.into())
    }

    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        TrackerError::ConfigError(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TrackerError::InvalidInput(_)
                | TrackerError::FileError(_)
                | TrackerError::ConfigError(_)
                | TrackerError::UnknownTool(_)
                | TrackerError::RunNotFound { .. }
        )
    }

    /// Whether the error means existing history could not be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::SnapshotCorruption(_))
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for TrackerError {
    fn from(err: serde_yaml::Error) -> Self {
        TrackerError::ConfigError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for TrackerError {
    fn from(err: toml::de::Error) -> Self {
        TrackerError::ConfigError(format!("TOML error: {}", err))
    }
}

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Why a single raw benchmark record could not be normalized
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The record carries no usable benchmark name
    #[error("benchmark entry has no name")]
    MissingName,

    /// The record has no `value` field at all
    #[error("benchmark '{name}' has no value")]
    MissingValue { name: String },

    /// The value is present but is not a finite number
    #[error("benchmark '{name}' has non-numeric value {raw}")]
    NonNumericValue { name: String, raw: String },
}
