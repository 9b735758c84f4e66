//! Persistent per-image metadata cache.
//!
//! Records live at `{cache_dir}/{identity}/info.json`. A missing record is
//! computed through the scheduler, written, and returned; an existing record
//! is read back without touching the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{ImageMetadata, SourceIdentity};

use super::engine::{ImageEngine, ImageStats};
use super::producer::write_atomically;
use super::scheduler::Scheduler;

/// Name of the metadata record inside an identity directory.
pub const INFO_FILE: &str = "info.json";

impl ImageMetadata {
    /// Build metadata from engine statistics.
    ///
    /// Lightness is the mean of the first three channel means. Sources with
    /// fewer channels average whatever channels they have.
    pub fn from_stats(stats: &ImageStats) -> Self {
        let channels = &stats.channel_means[..stats.channel_means.len().min(3)];
        let lightness = if channels.is_empty() {
            0.0
        } else {
            channels.iter().sum::<f64>() / channels.len() as f64
        };
        Self {
            width: stats.width,
            height: stats.height,
            lightness,
        }
    }
}

/// Retrieves or computes intrinsic metadata keyed by content identity.
#[derive(Clone)]
pub struct MetadataCache {
    cache_dir: PathBuf,
    engine: Arc<dyn ImageEngine>,
    scheduler: Scheduler,
}

impl MetadataCache {
    pub fn new(cache_dir: PathBuf, engine: Arc<dyn ImageEngine>, scheduler: Scheduler) -> Self {
        Self {
            cache_dir,
            engine,
            scheduler,
        }
    }

    /// Location of the record for `identity`.
    pub fn record_path(&self, identity: &SourceIdentity) -> PathBuf {
        self.cache_dir.join(identity.as_str()).join(INFO_FILE)
    }

    /// Return the metadata of `source`, computing and persisting it on a miss.
    pub async fn get(
        &self,
        source: &Path,
        identity: &SourceIdentity,
    ) -> PipelineResult<ImageMetadata> {
        let record = self.record_path(identity);

        if let Some(metadata) = read_record(&record).await? {
            tracing::trace!("Metadata cache hit for {}", identity);
            return Ok(metadata);
        }

        tracing::debug!("Metadata cache miss for {}, computing", identity);
        let engine = self.engine.clone();
        let source = source.to_path_buf();
        self.scheduler
            .submit(compute_and_store(engine, source, record))
            .await?
    }
}

/// Read a record; `Ok(None)` when it does not exist yet.
async fn read_record(record: &Path) -> PipelineResult<Option<ImageMetadata>> {
    match tokio::fs::read_to_string(record).await {
        Ok(data) => serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| PipelineError::CacheRecord {
                path: record.to_path_buf(),
                source: e,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::io(record, e)),
    }
}

async fn compute_and_store(
    engine: Arc<dyn ImageEngine>,
    source: PathBuf,
    record: PathBuf,
) -> PipelineResult<ImageMetadata> {
    let stat_source = source.clone();
    let stats = tokio::task::spawn_blocking(move || engine.stat(&stat_source))
        .await
        .map_err(|e| PipelineError::Metadata {
            path: source.clone(),
            message: format!("Task join error: {}", e),
        })??;
    let metadata = ImageMetadata::from_stats(&stats);

    if let Some(parent) = record.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    let json = serde_json::to_string(&metadata).map_err(|e| PipelineError::CacheRecord {
        path: record.clone(),
        source: e,
    })?;
    // Concurrent first reads may both get here; they write identical content.
    write_atomically(&record, json.as_bytes()).await?;

    Ok(metadata)
}
