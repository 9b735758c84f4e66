//! Core data types for the picset pipeline.
//!
//! These types describe what gets produced for one source image: its content
//! identity, its intrinsic metadata, and the matrix of encoded variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output encodings a variant can be produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
    Avif,
}

impl VariantFormat {
    /// File extension and public name ("jpeg", "webp", "avif").
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantFormat::Jpeg => "jpeg",
            VariantFormat::Webp => "webp",
            VariantFormat::Avif => "avif",
        }
    }

    /// MIME type for `<source type=...>` attributes.
    pub fn mime_type(&self) -> &'static str {
        match self {
            VariantFormat::Jpeg => "image/jpeg",
            VariantFormat::Webp => "image/webp",
            VariantFormat::Avif => "image/avif",
        }
    }
}

impl fmt::Display for VariantFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            other => Err(format!("unsupported variant format '{other}'")),
        }
    }
}

/// One (format, width) cell of the srcset matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantDefinition {
    pub format: VariantFormat,
    pub width: u32,
}

/// Short filesystem-safe token derived from a file's exact bytes.
///
/// Used as the key of both the metadata cache and the output cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceIdentity(String);

impl SourceIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intrinsic statistics of a source image, persisted in the metadata cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Mean of the red, green and blue channel means (0-255)
    pub lightness: f64,
}

/// A produced rendition of a source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVariant {
    pub format: VariantFormat,
    pub width: u32,
    /// Public URL or path as returned by the configured formatter
    pub src: String,
}

/// Everything known about one source image after a read.
///
/// Reassembled from the two caches on every read; never cached as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Content identity of the source
    pub key: SourceIdentity,

    /// Basename of the source file
    pub filename: String,

    #[serde(flatten)]
    pub metadata: ImageMetadata,

    /// Variants in matrix order
    pub matrix: Vec<ImageVariant>,
}

impl ImageRecord {
    /// Variants of a single format, in matrix order.
    pub fn variants_of(&self, format: VariantFormat) -> impl Iterator<Item = &ImageVariant> {
        self.matrix.iter().filter(move |v| v.format == format)
    }
}
