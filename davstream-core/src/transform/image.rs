//! Bandwidth-aware image resizing and re-encoding.

use ::image::codecs::avif::AvifEncoder;
use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::PngEncoder;
use ::image::codecs::webp::WebPEncoder;
use ::image::imageops::FilterType;
use ::image::{DynamicImage, GenericImageView};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use super::{Quality, TransformError, TransformResult};
use crate::streaming::{BandwidthClass, SourceError};
use crate::streaming::media_info::mime_for_path;

/// AVIF encoder speed; 1 is slowest, 10 fastest.
const AVIF_SPEED: u8 = 8;

/// Size and quality bounds for one optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImagePreset {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl ImagePreset {
    pub fn for_bandwidth(bandwidth: BandwidthClass) -> Self {
        match bandwidth {
            BandwidthClass::Low => Self {
                max_width: 640,
                max_height: 640,
                quality: 60,
            },
            BandwidthClass::Medium => Self {
                max_width: 1280,
                max_height: 1280,
                quality: 75,
            },
            BandwidthClass::High => Self {
                max_width: 1920,
                max_height: 1920,
                quality: 85,
            },
        }
    }

    /// Preset for a request, or `None` when the original is wanted.
    pub fn for_request(quality: Quality, bandwidth: BandwidthClass) -> Option<Self> {
        match quality {
            Quality::Original => None,
            Quality::Low => Some(Self::for_bandwidth(BandwidthClass::Low)),
            Quality::Medium => Some(Self::for_bandwidth(BandwidthClass::Medium)),
            Quality::High => Some(Self::for_bandwidth(BandwidthClass::High)),
            Quality::Auto => Some(Self::for_bandwidth(bandwidth)),
        }
    }

    pub fn cache_params(&self, format: OutputFormat) -> String {
        format!(
            "w={};h={};q={};fmt={}",
            self.max_width,
            self.max_height,
            self.quality,
            format.as_str()
        )
    }
}

/// Encodings an optimized image can be written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Avif,
    /// Animated content is never re-encoded
    Gif,
}

impl OutputFormat {
    /// Maps a requested format name; anything unrecognised becomes JPEG.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => OutputFormat::Jpeg,
            "png" => OutputFormat::Png,
            "webp" => OutputFormat::WebP,
            "avif" => OutputFormat::Avif,
            "gif" => OutputFormat::Gif,
            _ => OutputFormat::Jpeg,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
            OutputFormat::Gif => "gif",
        }
    }

    /// Codec used to re-encode, `None` for formats served as stored.
    fn codec(self) -> Option<Codec> {
        match self {
            OutputFormat::Jpeg => Some(Codec::Jpeg),
            OutputFormat::Png => Some(Codec::Png),
            OutputFormat::WebP => Some(Codec::WebP),
            OutputFormat::Avif => Some(Codec::Avif),
            OutputFormat::Gif => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Avif => "image/avif",
            OutputFormat::Gif => "image/gif",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Codec {
    Jpeg,
    Png,
    /// Lossless only; the preset quality does not apply
    WebP,
    Avif,
}

/// Result of [`ImageTransform::optimize`].
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub data: Bytes,
    pub format: String,
    pub content_type: String,
    /// False when the input was passed through unchanged
    pub transformed: bool,
}

/// Resizes and re-encodes images for the client's bandwidth.
#[derive(Debug, Clone)]
pub struct ImageTransform {
    skip_threshold: u64,
}

impl ImageTransform {
    pub fn new(skip_threshold: u64) -> Self {
        Self { skip_threshold }
    }

    /// Output format for a request: the requested one, else the source's own.
    pub fn target_format(source_format: &str, requested: Option<&str>) -> OutputFormat {
        OutputFormat::from_name(requested.unwrap_or(source_format))
    }

    /// True when the input is returned unchanged without decoding.
    pub fn should_skip(&self, size: u64, source_format: &str) -> bool {
        size < self.skip_threshold || source_format.eq_ignore_ascii_case("svg")
    }

    /// True when a request for `target` is served as stored.
    pub fn passes_through(&self, size: u64, source_format: &str, target: OutputFormat) -> bool {
        self.should_skip(size, source_format) || target.codec().is_none()
    }

    /// Buffers the whole input and optimizes it.
    ///
    /// # Errors
    ///
    /// - `TransformError::Source` - The input stream failed
    /// - `TransformError::Image` - The image could not be decoded or encoded
    pub async fn optimize<S>(
        &self,
        input: S,
        source_format: &str,
        target: OutputFormat,
        preset: ImagePreset,
    ) -> TransformResult<OptimizedImage>
    where
        S: Stream<Item = Result<Bytes, SourceError>> + Unpin,
    {
        let data = collect(input).await?;
        self.optimize_bytes(data, source_format, target, preset).await
    }

    /// Optimizes an already buffered image.
    pub async fn optimize_bytes(
        &self,
        data: Bytes,
        source_format: &str,
        target: OutputFormat,
        preset: ImagePreset,
    ) -> TransformResult<OptimizedImage> {
        let codec = match target.codec() {
            Some(codec) if !self.should_skip(data.len() as u64, source_format) => codec,
            _ => {
                tracing::debug!(
                    size = data.len(),
                    source_format,
                    "Serving image without re-encoding"
                );
                return Ok(passthrough(data, source_format));
            }
        };

        let input_size = data.len();
        let original = data.clone();
        let encoded = tokio::task::spawn_blocking(move || encode(&data, preset, codec)).await??;

        // Lossless WebP and PNG can outgrow an already compact source
        if encoded.len() > input_size {
            tracing::debug!(
                input_size,
                output_size = encoded.len(),
                format = target.as_str(),
                "Re-encoded image is larger than the source, serving original"
            );
            return Ok(passthrough(original, source_format));
        }

        tracing::debug!(
            input_size,
            output_size = encoded.len(),
            format = target.as_str(),
            max_width = preset.max_width,
            quality = preset.quality,
            "Image optimized"
        );

        Ok(OptimizedImage {
            data: Bytes::from(encoded),
            format: target.as_str().to_string(),
            content_type: target.content_type().to_string(),
            transformed: true,
        })
    }
}

fn passthrough(data: Bytes, source_format: &str) -> OptimizedImage {
    OptimizedImage {
        content_type: source_content_type(source_format),
        format: source_format.to_ascii_lowercase(),
        data,
        transformed: false,
    }
}

/// Reads a source stream to completion.
pub(crate) async fn collect<S>(mut input: S) -> Result<Bytes, SourceError>
where
    S: Stream<Item = Result<Bytes, SourceError>> + Unpin,
{
    let mut buffer = BytesMut::new();
    while let Some(chunk) = input.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}

fn source_content_type(source_format: &str) -> String {
    mime_for_path(&format!("image.{source_format}"))
}

fn image_error(e: ::image::ImageError) -> TransformError {
    TransformError::Image {
        reason: e.to_string(),
    }
}

fn encode(data: &[u8], preset: ImagePreset, codec: Codec) -> TransformResult<Vec<u8>> {
    let decoded = ::image::load_from_memory(data).map_err(image_error)?;
    let (width, height) = decoded.dimensions();

    let image = if width > preset.max_width || height > preset.max_height {
        decoded.resize(preset.max_width, preset.max_height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut out = Vec::new();
    match codec {
        Codec::Jpeg => {
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, preset.quality))
                .map_err(image_error)?;
        }
        Codec::Png => {
            image
                .write_with_encoder(PngEncoder::new(&mut out))
                .map_err(image_error)?;
        }
        Codec::WebP => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut out))
                .map_err(image_error)?;
        }
        Codec::Avif => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(AvifEncoder::new_with_speed_quality(
                    &mut out,
                    AVIF_SPEED,
                    preset.quality,
                ))
                .map_err(image_error)?;
        }
    }
    Ok(out)
}
