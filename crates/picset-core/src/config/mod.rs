//! Configuration management for picset.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. All config structs implement `Default`; [`GenOptions`] is the
//! runtime form handed to the pipeline.

mod options;
mod types;
mod validate;

pub use options::{GenOptions, UrlFormatter};
pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for picset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where variants are written and how they are referenced
    pub output: OutputConfig,

    /// Intermediate (metadata) cache settings
    pub cache: CacheConfig,

    /// Widths, formats and quality of the srcset matrix
    pub variants: VariantsConfig,

    /// Concurrency and admission-rate limits
    pub scheduler: SchedulerConfig,

    /// Directory input discovery
    pub discovery: DiscoveryConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.picset.picset/config.toml
    /// - Linux: ~/.config/picset/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\picset\config\config.toml
    ///
    /// Falls back to ~/.picset/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "picset", "picset")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".picset").join("config.toml")
            })
    }

    /// Resolved output directory (with ~ expansion).
    pub fn output_dir(&self) -> PathBuf {
        expand(&self.output.dir)
    }

    /// Resolved metadata cache directory (with ~ expansion).
    pub fn cache_dir(&self) -> PathBuf {
        expand(&self.cache.dir)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}
