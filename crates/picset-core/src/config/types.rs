//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::VariantFormat;

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory encoded variants are written to
    pub dir: PathBuf,

    /// Prefix joined to generated filenames to form public URLs
    pub url_prefix: String,

    /// Record output format ("json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./public/images"),
            url_prefix: "/".to_string(),
            format: "json".to_string(),
            pretty: false,
        }
    }
}

/// Intermediate cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding `{identity}/info.json` metadata records
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./.picset-cache"),
        }
    }
}

/// Srcset matrix settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantsConfig {
    /// Target widths in pixels
    pub widths: Vec<u32>,

    /// Target encodings
    pub formats: Vec<VariantFormat>,

    /// Encode quality (0-100)
    pub quality: u8,
}

impl Default for VariantsConfig {
    fn default() -> Self {
        Self {
            widths: vec![320, 640, 1280],
            formats: vec![VariantFormat::Jpeg, VariantFormat::Webp],
            quality: 80,
        }
    }
}

/// Admission control for heavy work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum jobs in flight at once
    pub concurrency: usize,

    /// Maximum jobs admitted per window
    pub rate_limit: usize,

    /// Length of the admission window in milliseconds
    pub rate_window_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            rate_limit: 10,
            rate_window_ms: 1000,
        }
    }
}

/// Directory input discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// File extensions picked up when walking a directory
    pub supported_extensions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            supported_extensions: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
                "gif".to_string(),
                "tiff".to_string(),
                "bmp".to_string(),
                "avif".to_string(),
            ],
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
