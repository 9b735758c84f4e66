//! Configuration validation with range checks.

use std::time::Duration;

use crate::error::ConfigError;

use super::{Config, GenOptions};

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        check_matrix(
            "variants.",
            &self.variants.widths,
            self.variants.formats.len(),
            self.variants.quality,
        )?;
        check_scheduler(
            "scheduler.",
            self.scheduler.concurrency,
            self.scheduler.rate_limit,
        )?;
        if self.scheduler.rate_window_ms == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.rate_window_ms must be > 0".to_string(),
            ));
        }
        if !matches!(self.output.format.as_str(), "json" | "jsonl") {
            return Err(ConfigError::ValidationError(format!(
                "output.format must be \"json\" or \"jsonl\", got \"{}\"",
                self.output.format
            )));
        }
        Ok(())
    }
}

impl GenOptions {
    /// Validate runtime options before building a pipeline.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        check_matrix("", &self.widths, self.formats.len(), self.quality)?;
        check_scheduler("", self.concurrency, self.rate_limit)?;
        if self.rate_window == Duration::ZERO {
            return Err(ConfigError::ValidationError(
                "rate_window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_matrix(
    prefix: &str,
    widths: &[u32],
    format_count: usize,
    quality: u8,
) -> Result<(), ConfigError> {
    if widths.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{prefix}widths must not be empty"
        )));
    }
    if widths.contains(&0) {
        return Err(ConfigError::ValidationError(format!(
            "{prefix}widths must all be > 0"
        )));
    }
    if format_count == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{prefix}formats must not be empty"
        )));
    }
    if quality > 100 {
        return Err(ConfigError::ValidationError(format!(
            "{prefix}quality must be between 0 and 100"
        )));
    }
    Ok(())
}

fn check_scheduler(
    prefix: &str,
    concurrency: usize,
    rate_limit: usize,
) -> Result<(), ConfigError> {
    if concurrency == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{prefix}concurrency must be > 0"
        )));
    }
    if rate_limit == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{prefix}rate_limit must be > 0"
        )));
    }
    Ok(())
}
