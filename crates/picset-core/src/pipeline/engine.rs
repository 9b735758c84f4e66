//! Resize/encode engine behind a trait.
//!
//! The pipeline only needs two capabilities from an engine: introspection
//! (dimensions and per-channel statistics) and "resize to width, then encode".
//! Both are blocking and are run on Tokio's blocking pool by their callers.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageEncoder};
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{VariantDefinition, VariantFormat};

/// Alpha-channel quality used for WebP variants.
pub const WEBP_ALPHA_QUALITY: u8 = 50;

/// Intrinsic statistics reported by an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStats {
    pub width: u32,
    pub height: u32,
    /// Mean value of each channel on a 0-255 scale, in channel order
    pub channel_means: Vec<f64>,
}

/// Format-specific encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: u8,
    pub progressive: bool,
    pub alpha_quality: Option<u8>,
}

impl EncodeParams {
    /// Settings used for `format` at the configured quality.
    pub fn for_format(format: VariantFormat, quality: u8) -> Self {
        match format {
            VariantFormat::Jpeg => Self {
                quality,
                progressive: true,
                alpha_quality: None,
            },
            VariantFormat::Webp => Self {
                quality,
                progressive: false,
                alpha_quality: Some(WEBP_ALPHA_QUALITY),
            },
            VariantFormat::Avif => Self {
                quality,
                progressive: false,
                alpha_quality: None,
            },
        }
    }
}

/// Image introspection and rendering capability.
pub trait ImageEngine: Send + Sync + 'static {
    /// Read dimensions and channel statistics of `source`.
    fn stat(&self, source: &Path) -> PipelineResult<ImageStats>;

    /// Resize `source` to `definition.width` and encode it.
    fn render(
        &self,
        source: &Path,
        definition: VariantDefinition,
        params: &EncodeParams,
    ) -> PipelineResult<Vec<u8>>;
}

/// Engine backed by the `image` crate for decoding and resizing.
///
/// JPEG is written progressive by `jpeg-encoder` and WebP lossy by libwebp,
/// since the `image` encoders for those formats ignore quality settings.
#[derive(Debug, Clone)]
pub struct RasterEngine {
    /// AVIF encoder speed, 1 (slowest) to 10 (fastest)
    avif_speed: u8,
}

impl Default for RasterEngine {
    fn default() -> Self {
        Self { avif_speed: 6 }
    }
}

impl RasterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_avif_speed(mut self, speed: u8) -> Self {
        self.avif_speed = speed.clamp(1, 10);
        self
    }

    /// Decode `path`, detecting the format from content rather than extension.
    fn open(path: &Path) -> PipelineResult<DynamicImage> {
        let reader = image::ImageReader::open(path)
            .map_err(|e| PipelineError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| PipelineError::io(path, e))?;
        reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: VariantFormat,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, String> {
        let quality = params.quality.clamp(1, 100);
        let (width, height) = image.dimensions();

        match format {
            VariantFormat::Jpeg => {
                let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
                    (Ok(w), Ok(h)) => (w, h),
                    _ => return Err(format!("{width}x{height} exceeds the JPEG size limit")),
                };
                let rgb = image.to_rgb8();
                let mut buffer = Vec::new();
                let mut encoder = jpeg_encoder::Encoder::new(&mut buffer, quality);
                encoder.set_progressive(params.progressive);
                encoder
                    .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
                    .map_err(|e| e.to_string())?;
                Ok(buffer)
            }
            VariantFormat::Webp => {
                let mut config =
                    webp::WebPConfig::new().map_err(|_| "invalid WebP configuration".to_string())?;
                config.lossless = 0;
                config.quality = quality as f32;
                config.alpha_quality = params.alpha_quality.unwrap_or(100).min(100) as i32;

                let encoded = if image.color().has_alpha() {
                    let rgba = image.to_rgba8();
                    webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_advanced(&config)
                } else {
                    let rgb = image.to_rgb8();
                    webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_advanced(&config)
                };
                encoded
                    .map(|memory| memory.to_vec())
                    .map_err(|e| format!("WebP encoding failed: {e:?}"))
            }
            VariantFormat::Avif => {
                let mut buffer = Vec::new();
                let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                    &mut buffer,
                    self.avif_speed,
                    quality,
                );
                let rgba = image.to_rgba8();
                encoder
                    .write_image(
                        rgba.as_raw(),
                        width,
                        height,
                        image::ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| e.to_string())?;
                Ok(buffer)
            }
        }
    }
}

impl ImageEngine for RasterEngine {
    fn stat(&self, source: &Path) -> PipelineResult<ImageStats> {
        let image = Self::open(source)?;
        let (width, height) = image.dimensions();
        Ok(ImageStats {
            width,
            height,
            channel_means: channel_means(&image),
        })
    }

    fn render(
        &self,
        source: &Path,
        definition: VariantDefinition,
        params: &EncodeParams,
    ) -> PipelineResult<Vec<u8>> {
        let image = Self::open(source)?;
        let (width, height) = image.dimensions();
        let target_height = scaled_height(width, height, definition.width);
        let resized = image.resize_exact(definition.width, target_height, FilterType::Lanczos3);

        self.encode(&resized, definition.format, params)
            .map_err(|e| PipelineError::Encode {
                path: source.to_path_buf(),
                format: definition.format.to_string(),
                width: definition.width,
                message: e,
            })
    }
}

/// Height keeping the aspect ratio when scaling `width` to `target_width`.
fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    let scaled = (height as u64 * target_width as u64 + width as u64 / 2) / width as u64;
    scaled.clamp(1, u32::MAX as u64) as u32
}

/// Mean of the red, green and blue channels.
fn channel_means(image: &DynamicImage) -> Vec<f64> {
    let rgb = image.to_rgb8();
    let pixels = (rgb.width() as u64 * rgb.height() as u64).max(1) as f64;
    let mut sums = [0u64; 3];
    for pixel in rgb.pixels() {
        for (sum, &value) in sums.iter_mut().zip(pixel.0.iter()) {
            *sum += value as u64;
        }
    }
    sums.iter().map(|&s| s as f64 / pixels).collect()
}
