use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::data_models::SourceKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },
    #[error("Unknown time zone '{name}' for {context}")]
    InvalidTimeZone { name: String, context: String },
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("Join tolerance of {value} seconds is out of range")]
    InvalidTolerance { value: i64 },
    #[error("No {kind} sources configured")]
    NoSources { kind: SourceKind },
}

/// Failures that abort the load of a single source file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error reading data file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error reading CSV headers in {path}: {source}")]
    HeaderReadError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Required columns missing from {path} ({kind} source): {missing:?}")]
    MissingColumns {
        path: PathBuf,
        kind: SourceKind,
        missing: Vec<String>,
    },
    #[error("No source files given for {kind} table")]
    EmptySourceList { kind: SourceKind },
    #[error("Source {path} is a {found} file but a {expected} table was requested")]
    MixedKinds {
        path: PathBuf,
        expected: SourceKind,
        found: SourceKind,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("Division by zero: total DC power is zero (AC total {numerator})")]
    DivisionByZero { numerator: f64 },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),
}
