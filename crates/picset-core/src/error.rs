//! Error types for the picset variant pipeline.
//!
//! Errors are organized by stage so that a failure names the file it concerns
//! and the step that broke (hashing, metadata, encoding, scheduling).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for picset operations.
#[derive(Error, Debug)]
pub enum PicsetError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Filesystem access failed (source read, cache write, output write)
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine could not decode the source image
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// The engine failed to produce one variant
    #[error("Encode error for {path} ({format} @ {width}w): {message}")]
    Encode {
        path: PathBuf,
        format: String,
        width: u32,
        message: String,
    },

    /// Intrinsic metadata could not be computed
    #[error("Metadata extraction failed for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// A metadata cache record exists but could not be parsed or written
    #[error("Invalid cache record {path}: {source}")]
    CacheRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A scheduled job was dropped before it delivered a result
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// No Tokio runtime was available to host background work
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

impl PipelineError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error is a not-found I/O failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Convenience type alias for picset results.
pub type Result<T> = std::result::Result<T, PicsetError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
