//! Resize and re-encode source images

use crate::error::{Result, TransformError};
use async_trait::async_trait;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader};
use image_params::{ImageFormat, ImageParams};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// AVIF encoder speed, 1 (slowest) to 10 (fastest)
const AVIF_SPEED: u8 = 8;

/// Encoded output of a transform
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Produces a delivery image from a source file
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    async fn transform(&self, source: &Path, params: &ImageParams) -> Result<TransformedImage>;

    /// Parameters that actually shape the output; requests that agree on
    /// these produce the same bytes and may share a cache entry
    fn output_params(&self, params: &ImageParams) -> ImageParams {
        *params
    }
}

/// Encoder defaults used when a request leaves quality out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformSettings {
    pub default_quality: u8,
    /// zlib level 0-9
    pub default_png_compression_level: u8,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            default_quality: 80,
            default_png_compression_level: 6,
        }
    }
}

/// [`ImageTransformer`] backed by the `image` crate
///
/// Decoding and encoding run on the blocking thread pool.
#[derive(Debug, Clone, Default)]
pub struct RasterTransformer {
    settings: TransformSettings,
}

impl RasterTransformer {
    pub fn new(settings: TransformSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ImageTransformer for RasterTransformer {
    async fn transform(&self, source: &Path, params: &ImageParams) -> Result<TransformedImage> {
        let source: PathBuf = source.to_path_buf();
        let params = *params;
        let settings = self.settings;
        let started = Instant::now();

        let output =
            tokio::task::spawn_blocking(move || encode(&source, &params, &settings)).await??;

        debug!(
            format = %params.format,
            width = ?params.width,
            height = ?params.height,
            quality = ?params.quality,
            size = output.bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transformed image"
        );
        Ok(output)
    }

    fn output_params(&self, params: &ImageParams) -> ImageParams {
        match params.format {
            // Lossless WebP ignores quality
            ImageFormat::Webp => ImageParams {
                quality: None,
                ..*params
            },
            _ => *params,
        }
    }
}

fn encode(source: &Path, params: &ImageParams, settings: &TransformSettings) -> Result<TransformedImage> {
    let mut img = ImageReader::open(source)?
        .with_guessed_format()?
        .decode()
        .map_err(|err| match err {
            ImageError::Unsupported(err) => TransformError::UnsupportedSource(err.to_string()),
            err => TransformError::from(err),
        })?;

    if params.width.is_some() || params.height.is_some() {
        let (width, height) = fit_inside(img.width(), img.height(), params.width, params.height);
        if (width, height) != (img.width(), img.height()) {
            img = img.resize_exact(width, height, FilterType::Lanczos3);
        }
    }

    let quality = params.quality.unwrap_or(settings.default_quality);
    let mut bytes = Vec::new();

    match params.format {
        ImageFormat::Webp => {
            // The pure-Rust WebP encoder is lossless only
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut bytes))?;
        }
        ImageFormat::Avif => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(
                AvifEncoder::new_with_speed_quality(&mut bytes, AVIF_SPEED, quality),
            )?;
        }
        ImageFormat::Jpeg | ImageFormat::Jpg => {
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;
        }
        ImageFormat::Png => {
            let level =
                png_compression_level(params.quality, settings.default_png_compression_level);
            img.write_with_encoder(PngEncoder::new_with_quality(
                &mut bytes,
                compression_type(level),
                PngFilterType::Adaptive,
            ))?;
        }
    }

    Ok(TransformedImage {
        bytes,
        content_type: params.format.content_type().to_string(),
    })
}

/// Largest size within the requested box that keeps the aspect ratio and
/// never upscales
pub fn fit_inside(
    src_width: u32,
    src_height: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (src_width, src_height);
    }

    let mut scale = 1.0_f64;
    if let Some(width) = width {
        scale = scale.min(f64::from(width) / f64::from(src_width));
    }
    if let Some(height) = height {
        scale = scale.min(f64::from(height) / f64::from(src_height));
    }
    if scale >= 1.0 {
        return (src_width, src_height);
    }

    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(src_width), scaled(src_height))
}

/// zlib level for a PNG: derived from quality when given, else the default
pub fn png_compression_level(quality: Option<u8>, default_level: u8) -> u8 {
    match quality {
        Some(quality) => ((f64::from(100 - quality.min(100)) / 10.0).round() as u8).min(9),
        None => default_level.min(9),
    }
}

fn compression_type(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat as CodecFormat, Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_source(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("source.png");
        RgbImage::from_pixel(width, height, Rgb([200, 40, 90]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_fit_inside_width_only() {
        assert_eq!(fit_inside(400, 200, Some(100), None), (100, 50));
    }

    #[test]
    fn test_fit_inside_both_bounds_keeps_ratio() {
        assert_eq!(fit_inside(400, 200, Some(100), Some(100)), (100, 50));
        assert_eq!(fit_inside(400, 200, Some(400), Some(50)), (100, 50));
    }

    #[test]
    fn test_fit_inside_never_enlarges() {
        assert_eq!(fit_inside(40, 20, Some(400), None), (40, 20));
        assert_eq!(fit_inside(40, 20, None, None), (40, 20));
    }

    #[test]
    fn test_fit_inside_keeps_at_least_one_pixel() {
        assert_eq!(fit_inside(1000, 2, Some(10), None), (10, 1));
    }

    #[test]
    fn test_png_compression_level() {
        assert_eq!(png_compression_level(None, 6), 6);
        assert_eq!(png_compression_level(Some(100), 6), 0);
        assert_eq!(png_compression_level(Some(80), 6), 2);
        assert_eq!(png_compression_level(Some(1), 6), 9);
    }

    #[tokio::test]
    async fn test_png_resize() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 40, 20);

        let output = RasterTransformer::default()
            .transform(&source, &ImageParams::new(ImageFormat::Png).with_width(10))
            .await
            .unwrap();

        assert_eq!(output.content_type, "image/png");
        let decoded = image::load_from_memory(&output.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 5));
    }

    #[tokio::test]
    async fn test_jpeg_and_jpg_encode_jpeg() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 16, 16);
        let transformer = RasterTransformer::default();

        for format in [ImageFormat::Jpeg, ImageFormat::Jpg] {
            let output = transformer
                .transform(&source, &ImageParams::new(format).with_quality(50))
                .await
                .unwrap();
            assert_eq!(output.content_type, "image/jpeg");
            assert_eq!(
                image::guess_format(&output.bytes).unwrap(),
                CodecFormat::Jpeg
            );
        }
    }

    #[tokio::test]
    async fn test_webp_output() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 30, 10);

        let output = RasterTransformer::default()
            .transform(&source, &ImageParams::new(ImageFormat::Webp).with_height(5))
            .await
            .unwrap();

        assert_eq!(output.content_type, "image/webp");
        assert_eq!(image::guess_format(&output.bytes).unwrap(), CodecFormat::WebP);
        let decoded = image::load_from_memory(&output.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (15, 5));
    }

    #[tokio::test]
    async fn test_missing_source_is_io_error() {
        let dir = tempdir().unwrap();
        let err = RasterTransformer::default()
            .transform(
                &dir.path().join("missing.png"),
                &ImageParams::new(ImageFormat::Png),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::TransformError::Io(_)));
    }

    #[tokio::test]
    async fn test_undecodable_source_is_image_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = RasterTransformer::default()
            .transform(&path, &ImageParams::new(ImageFormat::Png))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::TransformError::Image(_)));
    }

    #[tokio::test]
    async fn test_gif_source_is_decoded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        image::RgbaImage::from_pixel(20, 10, image::Rgba([10, 200, 30, 255]))
            .save(&path)
            .unwrap();

        let output = RasterTransformer::default()
            .transform(&path, &ImageParams::new(ImageFormat::Png).with_width(10))
            .await
            .unwrap();
        let decoded = image::load_from_memory(&output.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 5));
    }

    #[tokio::test]
    async fn test_avif_source_is_unsupported() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 16, 16);
        let transformer = RasterTransformer::default();

        let avif = transformer
            .transform(&source, &ImageParams::new(ImageFormat::Avif))
            .await
            .unwrap();
        let path = dir.path().join("photo.avif");
        std::fs::write(&path, &avif.bytes).unwrap();

        let err = transformer
            .transform(&path, &ImageParams::new(ImageFormat::Png))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::TransformError::UnsupportedSource(_)));
    }

    #[test]
    fn test_output_params_drop_webp_quality() {
        let transformer = RasterTransformer::default();

        let webp = ImageParams::new(ImageFormat::Webp).with_width(100);
        assert_eq!(transformer.output_params(&webp.with_quality(50)), webp);

        let png = ImageParams::new(ImageFormat::Png).with_quality(50);
        assert_eq!(transformer.output_params(&png), png);
    }
}
