//! Produces one encoded variant of a source image.
//!
//! The output directory doubles as the cache: a variant's filename encodes
//! the source identity and every encode parameter, so an existing file is a
//! finished variant and is never re-encoded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use crate::config::UrlFormatter;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ImageVariant, SourceIdentity, VariantDefinition};

use super::engine::{EncodeParams, ImageEngine};
use super::events::{EventBus, PipelineEvent};
use super::hash::Hasher;

/// Output filename for one variant of one source:
/// `{identity}.{options_token}.w{width}.q{quality}.{format}`.
///
/// The options token digests `w{width}:q{format}:f{quality}`; this exact
/// string is part of the on-disk cache key.
pub fn variant_filename(
    identity: &SourceIdentity,
    definition: VariantDefinition,
    quality: u8,
) -> String {
    let params = format!(
        "w{}:q{}:f{}",
        definition.width, definition.format, quality
    );
    format!(
        "{}.{}.w{}.q{}.{}",
        identity,
        Hasher::options_token(&params),
        definition.width,
        quality,
        definition.format
    )
}

/// A variant whose destination has been resolved and checked.
#[derive(Debug, Clone)]
pub struct PreparedVariant {
    pub source: PathBuf,
    pub definition: VariantDefinition,
    pub destination: PathBuf,
    pub variant: ImageVariant,
    /// The destination already existed when checked
    pub cached: bool,
}

/// Resizes, encodes and writes variants into the output directory.
pub struct VariantProducer {
    dir: PathBuf,
    quality: u8,
    url: UrlFormatter,
    engine: Arc<dyn ImageEngine>,
    events: EventBus,
    /// Per-destination locks for variants currently being encoded
    in_flight: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl VariantProducer {
    pub fn new(
        dir: PathBuf,
        quality: u8,
        url: UrlFormatter,
        engine: Arc<dyn ImageEngine>,
        events: EventBus,
    ) -> Self {
        Self {
            dir,
            quality,
            url,
            engine,
            events,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the destination and public reference of a variant, check
    /// whether it already exists, and publish a transform event.
    ///
    /// Runs synchronously so events follow the order of calls.
    pub fn prepare(
        &self,
        source: &Path,
        identity: &SourceIdentity,
        definition: VariantDefinition,
    ) -> PreparedVariant {
        let filename = variant_filename(identity, definition, self.quality);
        let destination = self.dir.join(&filename);
        let variant = ImageVariant {
            format: definition.format,
            width: definition.width,
            src: (self.url)(&filename),
        };
        let cached = destination.is_file();

        self.events.emit(PipelineEvent::Transform {
            filename: source.display().to_string(),
            format: variant.format,
            width: variant.width,
            src: variant.src.clone(),
            cached,
        });

        PreparedVariant {
            source: source.to_path_buf(),
            definition,
            destination,
            variant,
            cached,
        }
    }

    /// Encode and write a prepared variant unless it is already on disk.
    pub async fn finish(self: Arc<Self>, prepared: PreparedVariant) -> PipelineResult<ImageVariant> {
        if prepared.cached {
            return Ok(prepared.variant);
        }

        let lock = self.lock_for(&prepared.destination);
        let _guard = lock.lock().await;

        // Another request may have produced it while we waited.
        if is_variant_file(&prepared.destination).await? {
            tracing::trace!("{:?} produced concurrently", prepared.destination);
            return Ok(prepared.variant);
        }

        let start = std::time::Instant::now();
        let engine = self.engine.clone();
        let source = prepared.source.clone();
        let definition = prepared.definition;
        let params = EncodeParams::for_format(definition.format, self.quality);
        let bytes = tokio::task::spawn_blocking(move || engine.render(&source, definition, &params))
            .await
            .map_err(|e| PipelineError::Encode {
                path: prepared.source.clone(),
                format: definition.format.to_string(),
                width: definition.width,
                message: format!("Task join error: {}", e),
            })??;

        write_atomically(&prepared.destination, &bytes).await?;
        tracing::debug!(
            "Encoded {:?} ({} bytes) in {:?}",
            prepared.destination,
            bytes.len(),
            start.elapsed()
        );

        Ok(prepared.variant)
    }

    /// Produce one variant end to end.
    pub async fn produce(
        self: &Arc<Self>,
        source: &Path,
        identity: &SourceIdentity,
        definition: VariantDefinition,
    ) -> PipelineResult<ImageVariant> {
        let prepared = self.prepare(source, identity, definition);
        self.clone().finish(prepared).await
    }

    fn lock_for(&self, destination: &Path) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
        in_flight
            .entry(destination.to_path_buf())
            .or_default()
            .clone()
    }
}

/// Only a regular file counts as a finished variant.
async fn is_variant_file(destination: &Path) -> PipelineResult<bool> {
    match tokio::fs::metadata(destination).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(destination, e)),
    }
}

static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write to a sibling temp file and rename it into place, so a partially
/// written file is never mistaken for a finished one.
pub(crate) async fn write_atomically(destination: &Path, bytes: &[u8]) -> PipelineResult<()> {
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = PART_SEQ.fetch_add(1, Ordering::Relaxed);
    let partial = destination.with_file_name(format!(
        "{}.{}-{}.part",
        file_name,
        std::process::id(),
        seq
    ));

    if let Err(e) = tokio::fs::write(&partial, bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(PipelineError::io(&partial, e));
    }
    if let Err(e) = tokio::fs::rename(&partial, destination).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(PipelineError::io(destination, e));
    }
    Ok(())
}
