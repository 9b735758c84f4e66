//! Variant generation pipeline components.
//!
//! - **hash**: content identity and options tokens
//! - **matrix**: widths × formats expansion
//! - **scheduler**: concurrency- and rate-bounded job admission
//! - **engine**: resize/encode capability behind a trait
//! - **metadata**: persistent per-image metadata cache
//! - **producer**: encodes one variant into the output cache
//! - **events**: observability stream
//! - **discovery**: find image files in directories
//! - **processor**: orchestrates a full read

pub mod discovery;
pub mod engine;
pub mod events;
pub mod hash;
pub mod matrix;
pub mod metadata;
pub mod processor;
pub mod producer;
pub mod scheduler;

// Re-exports for convenient access
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use engine::{EncodeParams, ImageEngine, ImageStats, RasterEngine};
pub use events::{EventBus, PipelineEvent};
pub use hash::Hasher;
pub use matrix::build_matrix;
pub use metadata::MetadataCache;
pub use processor::ImageGen;
pub use producer::{variant_filename, PreparedVariant, VariantProducer};
pub use scheduler::{JobHandle, Scheduler, SchedulerLimits};
