//! Runtime options for an [`ImageGen`](crate::ImageGen) instance.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::Config;
use crate::types::VariantFormat;

/// Maps a generated filename to the public URL or path it is served under.
pub type UrlFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options supplied once, when the pipeline is constructed.
#[derive(Clone)]
pub struct GenOptions {
    /// Directory encoded variants are written to
    pub dir: PathBuf,

    /// Directory for intermediate metadata records
    pub cache_dir: PathBuf,

    /// Target widths (must be non-empty)
    pub widths: Vec<u32>,

    /// Target formats
    pub formats: Vec<VariantFormat>,

    /// Maximum jobs in flight at once
    pub concurrency: usize,

    /// Maximum jobs admitted per `rate_window`
    pub rate_limit: usize,

    pub rate_window: Duration,

    /// Encode quality (0-100)
    pub quality: u8,

    /// Filename to public reference
    pub url: UrlFormatter,
}

impl GenOptions {
    /// Create options with the required fields; everything else defaults.
    pub fn new(dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>, widths: Vec<u32>) -> Self {
        Self {
            dir: dir.into(),
            cache_dir: cache_dir.into(),
            widths,
            formats: vec![VariantFormat::Jpeg, VariantFormat::Webp],
            concurrency: 10,
            rate_limit: 10,
            rate_window: Duration::from_millis(1000),
            quality: 80,
            url: Arc::new(|filename: &str| format!("/{filename}")),
        }
    }

    /// Build options from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        let prefix = config.output.url_prefix.clone();
        Self::new(
            config.output_dir(),
            config.cache_dir(),
            config.variants.widths.clone(),
        )
        .with_formats(config.variants.formats.clone())
        .with_quality(config.variants.quality)
        .with_concurrency(config.scheduler.concurrency)
        .with_rate_limit(
            config.scheduler.rate_limit,
            Duration::from_millis(config.scheduler.rate_window_ms),
        )
        .with_url(move |filename| join_url(&prefix, filename))
    }

    pub fn with_formats(mut self, formats: Vec<VariantFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_rate_limit(mut self, limit: usize, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    /// Replace the URL formatter.
    pub fn with_url<F>(mut self, url: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.url = Arc::new(url);
        self
    }
}

impl fmt::Debug for GenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenOptions")
            .field("dir", &self.dir)
            .field("cache_dir", &self.cache_dir)
            .field("widths", &self.widths)
            .field("formats", &self.formats)
            .field("concurrency", &self.concurrency)
            .field("rate_limit", &self.rate_limit)
            .field("rate_window", &self.rate_window)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

/// Join a URL prefix and a filename with exactly one `/` between them.
fn join_url(prefix: &str, filename: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        format!("{prefix}{filename}")
    } else {
        format!("{prefix}/{filename}")
    }
}
