use futures::future::join_all;
use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use tracing::debug;

/// JPEG qualities tried in order until the encoded photo fits the byte
/// budget. The last rung is kept even when it still exceeds the budget.
const QUALITY_LADDER: [u8; 5] = [85, 75, 65, 50, 35];

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),

    #[error("Failed to encode JPEG: {0}")]
    Encode(image::ImageError),

    #[error("Compression task aborted: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Target upper bound for the encoded result, in bytes
    pub max_bytes: usize,
    /// Maximum width or height of the result, in pixels
    pub max_dimension: u32,
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Downsizes photos before they reach object storage.
///
/// Inputs already inside both bounds pass through untouched. Everything
/// else is resized to fit the dimension bound and re-encoded as JPEG,
/// stepping down the quality ladder until the byte budget holds.
pub struct ImageCompressor {
    config: CompressionConfig,
}

impl ImageCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// CPU-bound; call through `compress_batch` from async contexts.
    pub fn compress(&self, data: &[u8]) -> Result<CompressedImage, CompressionError> {
        let format = image::guess_format(data).map_err(CompressionError::Decode)?;
        let img = image::load_from_memory(data).map_err(CompressionError::Decode)?;

        let (width, height) = (img.width(), img.height());
        let within_bounds =
            width <= self.config.max_dimension && height <= self.config.max_dimension;

        if within_bounds && data.len() <= self.config.max_bytes {
            return Ok(CompressedImage {
                data: data.to_vec(),
                content_type: content_type_for(format),
                width,
                height,
            });
        }

        // Resize to fit max_dimension on the longer side, preserving aspect ratio
        let resized = if within_bounds {
            img
        } else {
            img.thumbnail(self.config.max_dimension, self.config.max_dimension)
        };
        let (out_width, out_height) = (resized.width(), resized.height());

        // JPEG has no alpha channel. Convert down to 8-bit RGB.
        let rgb = image::DynamicImage::ImageRgb8(resized.to_rgb8());

        let mut encoded = Vec::new();
        for quality in QUALITY_LADDER {
            encoded.clear();
            let encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
            rgb.write_with_encoder(encoder)
                .map_err(CompressionError::Encode)?;

            if encoded.len() <= self.config.max_bytes {
                break;
            }
        }

        debug!(
            "Compressed photo: {}x{} ({} bytes) -> {}x{} ({} bytes)",
            width,
            height,
            data.len(),
            out_width,
            out_height,
            encoded.len()
        );

        Ok(CompressedImage {
            data: encoded,
            content_type: "image/jpeg",
            width: out_width,
            height: out_height,
        })
    }

    /// Compress a whole batch on the blocking pool, one task per photo.
    /// Results come back in input order, one per input.
    pub async fn compress_batch(
        &self,
        items: Vec<Vec<u8>>,
    ) -> Vec<Result<CompressedImage, CompressionError>> {
        let tasks: Vec<_> = items
            .into_iter()
            .map(|data| {
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || {
                    ImageCompressor::new(config).compress(&data)
                })
            })
            .collect();

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(CompressionError::Task(e.to_string())),
            })
            .collect()
    }
}

fn content_type_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        _ => "image/jpeg",
    }
}
