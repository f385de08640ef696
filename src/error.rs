//! Error types for cmdcheck.
//!
//! These cover the boundary only: loading definitions and writing reports.
//! Anything that goes wrong inside a single test case is recorded in its
//! `TestResult` instead.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for definition loading.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Failed to read the file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse YAML.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to parse TOML.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Unsupported file extension.
    #[error("unsupported file format: {0:?} (expected .json, .yaml, .yml, or .toml)")]
    UnsupportedFormat(String),

    /// The document has no `test_cases` list.
    #[error("definition file must contain a top-level list key 'test_cases'")]
    MissingTestCases,

    /// A timeout is not a finite positive number of seconds.
    #[error("{location}: timeout must be a positive number of seconds, got {value}")]
    InvalidTimeout { location: String, value: f64 },
}

/// Error type for report generation.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Failed to create the report directory or write the report.
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize results.
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Top-level error type for the driver.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Report(#[from] ReportError),

    /// There was nothing to run.
    #[error("no test cases to run")]
    NoTestCases,
}

/// Result type alias for cmdcheck operations.
pub type Result<T> = std::result::Result<T, Error>;
