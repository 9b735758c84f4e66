//! Picset Core - cached srcset generation for images.
//!
//! Picset turns one source image into a matrix of resized, re-encoded
//! variants (widths × formats) and a record describing them, without redoing
//! work that an earlier run or a concurrent read already did.
//!
//! # Architecture
//!
//! ```text
//! read_image ─► content identity ─┬─► metadata cache ({cache}/{id}/info.json)
//!                                 └─► matrix ─► scheduler ─► producer ({dir}/{id}.{opts}.w{w}.q{q}.{fmt})
//!                                                  │
//!                                      concurrency + rate ceilings
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use picset_core::{GenOptions, ImageGen};
//!
//! #[tokio::main]
//! async fn main() -> picset_core::Result<()> {
//!     let options = GenOptions::new("public/img", ".cache/img", vec![320, 640, 1280]);
//!     let gen = ImageGen::new(options)?;
//!
//!     let record = gen.read_image("photos/cat.png").await?;
//!     for variant in &record.matrix {
//!         println!("{} {}w", variant.src, variant.width);
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod types;

// Re-exports for convenient access
pub use config::{Config, GenOptions, UrlFormatter};
pub use error::{ConfigError, PicsetError, PipelineError, PipelineResult, Result};
pub use output::{srcset, OutputFormat, RecordWriter, SrcSet};
pub use pipeline::{
    DiscoveredFile, FileDiscovery, ImageEngine, ImageGen, PipelineEvent, RasterEngine,
};
pub use types::{
    ImageMetadata, ImageRecord, ImageVariant, SourceIdentity, VariantDefinition, VariantFormat,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
