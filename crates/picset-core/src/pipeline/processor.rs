//! Pipeline orchestration - wires key derivation, the two caches and the
//! scheduler together into one read operation.

use std::path::Path;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::sync::{broadcast, OnceCell};

use crate::config::GenOptions;
use crate::error::{PipelineError, PipelineResult, Result};
use crate::types::{ImageRecord, ImageVariant, VariantDefinition};

use super::engine::{ImageEngine, RasterEngine};
use super::events::{EventBus, PipelineEvent};
use super::hash::Hasher;
use super::matrix::build_matrix;
use super::metadata::MetadataCache;
use super::producer::VariantProducer;
use super::scheduler::{JobHandle, Scheduler, SchedulerLimits};

/// Turns source images into [`ImageRecord`]s with a full srcset matrix.
///
/// One instance owns one scheduler: every read made through it shares the
/// same concurrency and rate ceilings.
pub struct ImageGen {
    options: GenOptions,
    matrix: Vec<VariantDefinition>,
    scheduler: Scheduler,
    metadata: MetadataCache,
    producer: Arc<VariantProducer>,
    events: EventBus,
    ready: OnceCell<()>,
}

impl ImageGen {
    /// Create a pipeline using the `image`-crate engine.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(options: GenOptions) -> Result<Self> {
        Self::with_engine(options, Arc::new(RasterEngine::new()))
    }

    /// Create a pipeline with a custom engine.
    pub fn with_engine(options: GenOptions, engine: Arc<dyn ImageEngine>) -> Result<Self> {
        options.validate()?;

        let scheduler = Scheduler::new(SchedulerLimits::from(&options))?;
        let events = EventBus::new();
        let metadata = MetadataCache::new(
            options.cache_dir.clone(),
            engine.clone(),
            scheduler.clone(),
        );
        let producer = Arc::new(VariantProducer::new(
            options.dir.clone(),
            options.quality,
            options.url.clone(),
            engine,
            events.clone(),
        ));
        let matrix = build_matrix(&options.widths, &options.formats);

        tracing::debug!(
            "Image pipeline: {} variant(s) per image into {:?}",
            matrix.len(),
            options.dir
        );

        Ok(Self {
            options,
            matrix,
            scheduler,
            metadata,
            producer,
            events,
            ready: OnceCell::new(),
        })
    }

    /// Receive pipeline events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn options(&self) -> &GenOptions {
        &self.options
    }

    /// Variant definitions produced for every image, in submission order.
    pub fn matrix(&self) -> &[VariantDefinition] {
        &self.matrix
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Create the output directory and publish `Initialized`.
    ///
    /// Runs once; concurrent and later callers wait for that single run. A
    /// failed attempt leaves the pipeline uninitialized so it can be retried.
    pub async fn initialize(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.options.dir)
                    .await
                    .map_err(|e| PipelineError::io(&self.options.dir, e))?;
                tracing::info!("Output directory ready: {:?}", self.options.dir);
                self.events.emit(PipelineEvent::Initialized);
                Ok::<(), PipelineError>(())
            })
            .await?;
        Ok(())
    }

    /// Read one source image into a complete record.
    ///
    /// Every variant is either found in the output directory or encoded
    /// there. If any variant fails the whole read fails; variants already
    /// in flight still run to completion.
    pub async fn read_image(&self, path: impl AsRef<Path>) -> Result<ImageRecord> {
        self.initialize().await?;

        let path = path.as_ref();
        let start = std::time::Instant::now();
        self.events.emit(PipelineEvent::Read {
            filename: path.display().to_string(),
        });

        let identity = Hasher::content_identity(path).await?;

        // Submitted synchronously so events and admission follow matrix order.
        let jobs: Vec<VariantJob> = self
            .matrix
            .iter()
            .map(|&definition| {
                let prepared = self.producer.prepare(path, &identity, definition);
                if prepared.cached {
                    VariantJob::Ready(prepared.variant)
                } else {
                    let producer = self.producer.clone();
                    VariantJob::Scheduled(self.scheduler.submit(producer.finish(prepared)))
                }
            })
            .collect();

        let metadata = self.metadata.get(path, &identity);
        let variants = try_join_all(jobs.into_iter().map(VariantJob::resolve));
        let (metadata, matrix) = tokio::try_join!(metadata, variants)?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        tracing::debug!(
            "Read {:?} as {} in {:?} ({}x{}, {} variants)",
            filename,
            identity,
            start.elapsed(),
            metadata.width,
            metadata.height,
            matrix.len()
        );

        Ok(ImageRecord {
            key: identity,
            filename,
            metadata,
            matrix,
        })
    }
}

/// A variant that is either already on disk or waiting in the scheduler.
enum VariantJob {
    Ready(ImageVariant),
    Scheduled(JobHandle<PipelineResult<ImageVariant>>),
}

impl VariantJob {
    async fn resolve(self) -> PipelineResult<ImageVariant> {
        match self {
            VariantJob::Ready(variant) => Ok(variant),
            VariantJob::Scheduled(handle) => handle.await?,
        }
    }
}
